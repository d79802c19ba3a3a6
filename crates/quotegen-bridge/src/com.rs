//! Late-bound IDispatch calls, the way a script host talks to Excel.

#![cfg(windows)]

use std::mem::ManuallyDrop;
use std::ptr;

use windows::{
    core::{BSTR, GUID, HSTRING, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CLSIDFromProgID, CoCreateInstance, IDispatch, CLSCTX_LOCAL_SERVER, DISPATCH_FLAGS,
                DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS,
                EXCEPINFO,
            },
            Ole::DISPID_PROPERTYPUT,
            Variant::{VARIANT, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_EMPTY, VT_I4, VT_NULL},
        },
    },
};

pub fn bool_arg(val: bool) -> VARIANT {
    // The union fields are ManuallyDrop, so they are written through ptr::write
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

pub fn int_arg(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

pub fn str_arg(val: &str) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(BSTR::from(val)));
        v
    }
}

/// An automation object (Application, Workbooks, Workbook)
#[derive(Clone)]
pub struct Automation {
    inner: IDispatch,
}

impl Automation {
    /// Start a local server from its ProgID, e.g. `Excel.Application`
    pub fn create(progid: &str) -> Result<Self, String> {
        unsafe {
            let clsid = CLSIDFromProgID(&HSTRING::from(progid))
                .map_err(|e| format!("CLSIDFromProgID('{progid}') failed: {e}"))?;
            let inner: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| format!("CoCreateInstance('{progid}') failed: {e}"))?;
            Ok(Self { inner })
        }
    }

    pub fn put(&self, name: &str, value: VARIANT) -> Result<(), String> {
        self.invoke(name, DISPATCH_PROPERTYPUT, vec![value]).map(drop)
    }

    pub fn child(&self, name: &str) -> Result<Automation, String> {
        let result = self.invoke(name, DISPATCH_PROPERTYGET, Vec::new())?;
        as_object(&result, name)
    }

    /// Call a method. `args` are in source order.
    pub fn call(&self, name: &str, args: Vec<VARIANT>) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_METHOD, args)
    }

    pub fn call_object(&self, name: &str, args: Vec<VARIANT>) -> Result<Automation, String> {
        let result = self.call(name, args)?;
        as_object(&result, name)
    }

    fn invoke(
        &self,
        name: &str,
        flags: DISPATCH_FLAGS,
        mut args: Vec<VARIANT>,
    ) -> Result<VARIANT, String> {
        let dispid = self.dispid(name)?;
        // DISPPARAMS carries arguments last-to-first
        args.reverse();
        let mut named = [DISPID_PROPERTYPUT];
        let is_put = flags == DISPATCH_PROPERTYPUT;

        unsafe {
            let params = DISPPARAMS {
                rgvarg: if args.is_empty() {
                    ptr::null_mut()
                } else {
                    args.as_mut_ptr()
                },
                rgdispidNamedArgs: if is_put {
                    named.as_mut_ptr()
                } else {
                    ptr::null_mut()
                },
                cArgs: args.len() as u32,
                cNamedArgs: u32::from(is_put),
            };
            let mut result = VARIANT::default();
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    flags,
                    &params,
                    if is_put { None } else { Some(&mut result) },
                    Some(&mut except),
                    None,
                )
                .map_err(|e| describe_failure(e, &except, name))?;
            Ok(result)
        }
    }

    fn dispid(&self, name: &str) -> Result<i32, String> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0i32;
        unsafe {
            self.inner
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    GetSystemDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| format!("unknown member '{name}': {e}"))?;
        }
        Ok(dispid)
    }
}

fn as_object(result: &VARIANT, member: &str) -> Result<Automation, String> {
    unsafe {
        let vt = result.Anonymous.Anonymous.vt;
        if vt == VT_DISPATCH {
            let disp: &Option<IDispatch> = &result.Anonymous.Anonymous.Anonymous.pdispVal;
            if let Some(inner) = disp.clone() {
                return Ok(Automation { inner });
            }
        }
        if vt == VT_EMPTY || vt == VT_NULL || vt == VT_DISPATCH {
            Err(format!("'{member}' returned nothing"))
        } else {
            Err(format!("'{member}' returned VT={}, expected an object", vt.0))
        }
    }
}

fn describe_failure(err: windows::core::Error, except: &EXCEPINFO, member: &str) -> String {
    if err.code() != DISP_E_EXCEPTION {
        return format!("{member} failed: {err}");
    }
    let description = if except.bstrDescription.is_empty() {
        "(no description)".to_string()
    } else {
        except.bstrDescription.to_string()
    };
    format!("{member} raised: {description}")
}
