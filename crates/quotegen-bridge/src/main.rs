//! quotegen-bridge: a Windows process that exports workbooks to PDF through
//! Excel's COM automation, driven by JSON lines on stdin.
//!
//! Built with `--target x86_64-pc-windows-gnu`; on Linux it runs under WINE.
//! Responses go to stdout, one per line. Diagnostics go to stderr only.

#[cfg(windows)]
mod com;
#[cfg(windows)]
mod excel;

#[cfg(not(windows))]
fn main() {
    eprintln!("quotegen-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead, Write};

    use quotegen_bridge_protocol::{Command, Request, Response};

    eprintln!("[quotegen-bridge] ready");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut excel: Option<excel::Excel> = None;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("[quotegen-bridge] stdin read error: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (response, shutdown) = match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                let shutdown = matches!(request.command, Command::Shutdown);
                (handle(&mut excel, request), shutdown)
            }
            Err(e) => {
                eprintln!("[quotegen-bridge] bad request line: {line}");
                (Response::error(0, format!("JSON parse error: {e}")), false)
            }
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                let _ = writeln!(out, "{json}");
                let _ = out.flush();
            }
            Err(e) => eprintln!("[quotegen-bridge] could not encode response: {e}"),
        }

        if shutdown {
            break;
        }
    }

    // Client went away without Shutdown
    if let Some(app) = excel.take() {
        eprintln!("[quotegen-bridge] input closed, quitting Excel");
        if let Err(e) = app.quit() {
            eprintln!("[quotegen-bridge] {e}");
        }
        uninit_com();
    }
}

#[cfg(windows)]
fn handle(
    excel: &mut Option<excel::Excel>,
    request: quotegen_bridge_protocol::Request,
) -> quotegen_bridge_protocol::Response {
    use quotegen_bridge_protocol::{Command, Response, ResponseData, ResponseResult};

    let id = request.id;
    let outcome = match request.command {
        Command::Init => init(excel),
        Command::OpenWorkbook { path } => running(excel).and_then(|app| app.open(&path)).map(
            |workbook| Some(ResponseData::WorkbookHandle { workbook }),
        ),
        Command::ExportPdf { workbook, path } => running(excel)
            .and_then(|app| app.export_pdf(workbook, &path))
            .map(|()| None),
        Command::CloseWorkbook { workbook } => running(excel)
            .and_then(|app| app.close(workbook))
            .map(|()| None),
        Command::Shutdown => match excel.take() {
            Some(app) => {
                let quit = app.quit();
                uninit_com();
                quit.map(|()| None)
            }
            None => Ok(None),
        },
    };

    match outcome {
        Ok(data) => Response {
            id,
            result: ResponseResult::Ok { data },
        },
        Err(message) => Response::error(id, message),
    }
}

#[cfg(windows)]
fn running(excel: &mut Option<excel::Excel>) -> Result<&mut excel::Excel, String> {
    excel
        .as_mut()
        .ok_or_else(|| "Excel not started; send Init first".to_string())
}

#[cfg(windows)]
fn init(
    excel: &mut Option<excel::Excel>,
) -> Result<Option<quotegen_bridge_protocol::ResponseData>, String> {
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if excel.is_some() {
        return Ok(None);
    }

    // Excel requires a single-threaded apartment
    unsafe {
        CoInitializeEx(None, COINIT_APARTMENTTHREADED)
            .ok()
            .map_err(|e| format!("CoInitializeEx failed: {e}"))?;
    }

    match excel::Excel::start() {
        Ok(app) => {
            eprintln!("[quotegen-bridge] Excel.Application started");
            *excel = Some(app);
            Ok(None)
        }
        Err(e) => {
            uninit_com();
            Err(format!("could not start Excel: {e}"))
        }
    }
}

#[cfg(windows)]
fn uninit_com() {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
}
