//! Shared-string table: distinct text values indexed in first-seen order.

use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use crate::spec::{Result, XlsxConvertError};
use crate::util::xml_escape;

const N_SST_UNIQUE_MAX: usize = i32::MAX as usize;

/// Shared-string table for one workbook.
#[derive(Debug, Default)]
pub struct SharedStringTable {
    l_strings: Vec<String>,
    dict_index: HashMap<String, u32>,
    n_refs: usize,
}

impl SharedStringTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `s`, adding it on first sight. Every call counts one reference.
    pub fn add_string(&mut self, s: &str) -> Result<u32> {
        self.n_refs += 1;
        if let Some(&n_idx) = self.dict_index.get(s) {
            return Ok(n_idx);
        }
        if self.l_strings.len() >= N_SST_UNIQUE_MAX {
            return Err(XlsxConvertError::LimitExceeded {
                what: "shared strings",
                limit: N_SST_UNIQUE_MAX,
                found: self.l_strings.len() + 1,
            });
        }
        let n_idx = self.l_strings.len() as u32;
        self.l_strings.push(s.to_string());
        self.dict_index.insert(s.to_string(), n_idx);
        Ok(n_idx)
    }

    /// Distinct strings.
    pub fn unique_count(&self) -> usize {
        self.l_strings.len()
    }

    /// Cell references made through [`SharedStringTable::add_string`].
    pub fn count(&self) -> usize {
        self.n_refs
    }

    /// Strings in index order.
    pub fn strings(&self) -> &[String] {
        &self.l_strings
    }

    /// Render `xl/sharedStrings.xml`.
    pub fn to_xml(&self) -> String {
        let n_bytes: usize = self.l_strings.iter().map(|s| s.len() + 16).sum();
        let mut out = String::with_capacity(256 + n_bytes);
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        let _ = write!(
            out,
            r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
            self.n_refs,
            self.l_strings.len()
        );
        for s in &self.l_strings {
            if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
                let _ = write!(
                    out,
                    r#"<si><t xml:space="preserve">{}</t></si>"#,
                    xml_escape(s)
                );
            } else {
                let _ = write!(out, "<si><t>{}</t></si>", xml_escape(s));
            }
        }
        out.push_str("</sst>");
        out
    }
}
