//! The handful of Excel operations needed to turn a workbook into a PDF.

#![cfg(windows)]

use std::collections::HashMap;

use quotegen_bridge_protocol::XL_TYPE_PDF;

use crate::com::{bool_arg, int_arg, str_arg, Automation};

/// A hidden Excel instance and the workbooks it has open
pub struct Excel {
    app: Automation,
    workbooks: Automation,
    open: HashMap<u64, Automation>,
    next_handle: u64,
}

impl Excel {
    pub fn start() -> Result<Self, String> {
        let app = Automation::create("Excel.Application")?;
        app.put("Visible", bool_arg(false))?;
        // Overwrite prompts and link-update questions would block forever
        app.put("DisplayAlerts", bool_arg(false))?;
        app.put("ScreenUpdating", bool_arg(false))?;
        let workbooks = app.child("Workbooks")?;

        Ok(Self {
            app,
            workbooks,
            open: HashMap::new(),
            next_handle: 1,
        })
    }

    pub fn open(&mut self, path: &str) -> Result<u64, String> {
        let workbook = self.workbooks.call_object("Open", vec![str_arg(path)])?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.open.insert(handle, workbook);
        Ok(handle)
    }

    pub fn export_pdf(&self, handle: u64, path: &str) -> Result<(), String> {
        let workbook = self
            .open
            .get(&handle)
            .ok_or_else(|| format!("unknown workbook handle {handle}"))?;
        workbook.call(
            "ExportAsFixedFormat",
            vec![int_arg(XL_TYPE_PDF), str_arg(path)],
        )?;
        Ok(())
    }

    /// Close without saving
    pub fn close(&mut self, handle: u64) -> Result<(), String> {
        let workbook = self
            .open
            .remove(&handle)
            .ok_or_else(|| format!("unknown workbook handle {handle}"))?;
        workbook.call("Close", vec![bool_arg(false)])?;
        Ok(())
    }

    pub fn quit(mut self) -> Result<(), String> {
        let handles: Vec<u64> = self.open.keys().copied().collect();
        for handle in handles {
            if let Err(e) = self.close(handle) {
                eprintln!("[quotegen-bridge] close of workbook {handle} failed: {e}");
            }
        }
        self.app.call("Quit", Vec::new())?;
        Ok(())
    }
}
