//! Archive re-reading helpers shared by integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Read};

use chrono::{NaiveDate, TimeDelta};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tablekit_io_xlsx::cell::parse_fixed_offset;
use tablekit_io_xlsx::{EnumCellValue, derive_date_serial};
use zip::ZipArchive;

/// One `<c>` element of a worksheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecParsedCell {
    pub r: String,
    pub t: Option<String>,
    pub s: u32,
    pub v: Option<String>,
}

/// Parsed view of a produced workbook.
pub struct SpecParsedWorkbook {
    pub part_names: Vec<String>,
    pub rows: Vec<Vec<SpecParsedCell>>,
    pub shared_strings: Vec<String>,
    pub sst_count: usize,
    pub cell_xf_num_fmt_ids: Vec<u32>,
    pub num_fmts: HashMap<u32, String>,
    pub sheet_xml: String,
    pub workbook_xml: String,
}

impl SpecParsedWorkbook {
    pub fn from_bytes(v_bytes: &[u8]) -> Self {
        let mut archive = ZipArchive::new(Cursor::new(v_bytes)).expect("valid zip");
        let part_names = (0..archive.len())
            .map(|n_idx| archive.by_index(n_idx).expect("entry").name().to_string())
            .collect();
        let sheet_xml = read_part(&mut archive, "xl/worksheets/sheet1.xml");
        let sst_xml = read_part(&mut archive, "xl/sharedStrings.xml");
        let styles_xml = read_part(&mut archive, "xl/styles.xml");
        let workbook_xml = read_part(&mut archive, "xl/workbook.xml");
        let (shared_strings, sst_count) = parse_shared_strings(&sst_xml);
        let (cell_xf_num_fmt_ids, num_fmts) = parse_styles(&styles_xml);

        Self {
            part_names,
            rows: parse_sheet_rows(&sheet_xml),
            shared_strings,
            sst_count,
            cell_xf_num_fmt_ids,
            num_fmts,
            sheet_xml,
            workbook_xml,
        }
    }

    /// Cell by A1 reference.
    pub fn cell(&self, c_ref: &str) -> &SpecParsedCell {
        self.rows
            .iter()
            .flatten()
            .find(|cell| cell.r == c_ref)
            .unwrap_or_else(|| panic!("cell {c_ref} not found"))
    }

    /// Number format code applied to `cell`.
    pub fn format_code(&self, cell: &SpecParsedCell) -> String {
        let n_fmt_id = self.cell_xf_num_fmt_ids[cell.s as usize];
        match n_fmt_id {
            0 => "General".to_string(),
            1 => "0".to_string(),
            2 => "0.00".to_string(),
            _ => self
                .num_fmts
                .get(&n_fmt_id)
                .cloned()
                .unwrap_or_else(|| panic!("numFmt {n_fmt_id} not declared")),
        }
    }

    /// Decode a cell back into a value using its type tag and number format.
    pub fn decode(&self, cell: &SpecParsedCell) -> EnumCellValue {
        let Some(c_v) = cell.v.as_deref() else {
            return EnumCellValue::Empty;
        };
        match cell.t.as_deref() {
            Some("s") => {
                let n_idx: usize = c_v.parse().expect("sst index");
                return EnumCellValue::Text(self.shared_strings[n_idx].clone());
            }
            Some("b") => return EnumCellValue::Boolean(c_v == "1"),
            _ => {}
        }

        let c_format = self.format_code(cell);
        if c_format.contains('h') {
            let x_serial: f64 = c_v.parse().expect("serial");
            let n_days = x_serial.floor() as i64;
            let n_ms = ((x_serial - n_days as f64) * 86_400_000.0).round() as i64;
            let value = decode_date_serial(n_days)
                .and_hms_opt(0, 0, 0)
                .expect("midnight")
                + TimeDelta::milliseconds(n_ms);
            let offset = c_format
                .split('"')
                .nth(1)
                .and_then(parse_fixed_offset);
            EnumCellValue::DateTime { value, offset }
        } else if c_format.contains('y') {
            EnumCellValue::Date(decode_date_serial(c_v.parse().expect("serial")))
        } else if c_format.contains('.') {
            EnumCellValue::Float(c_v.parse().expect("float"))
        } else {
            match c_v.parse::<i64>() {
                Ok(n) => EnumCellValue::Integer(n),
                Err(_) => EnumCellValue::Float(c_v.parse().expect("number")),
            }
        }
    }
}

/// Inverse of the 1900-system serial for serials in range.
pub fn decode_date_serial(n_serial: i64) -> NaiveDate {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30).expect("epoch");
    let date = base + TimeDelta::days(n_serial);
    if derive_date_serial(date) == Some(n_serial) {
        return date;
    }
    base + TimeDelta::days(n_serial + 1)
}

/// Resolve `_xHHHH_` escapes the way spreadsheet readers do.
pub fn decode_ooxml_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut n_idx = 0;
    while n_idx < s.len() {
        let tail = &s[n_idx..];
        let v_bytes = tail.as_bytes();
        if v_bytes.len() >= 7
            && v_bytes.starts_with(b"_x")
            && v_bytes[2..6].iter().all(u8::is_ascii_hexdigit)
            && v_bytes[6] == b'_'
            && let Some(chr) = u32::from_str_radix(&tail[2..6], 16)
                .ok()
                .and_then(char::from_u32)
        {
            out.push(chr);
            n_idx += 7;
            continue;
        }
        let chr = tail.chars().next().expect("char boundary");
        out.push(chr);
        n_idx += chr.len_utf8();
    }
    out
}

fn read_part(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> String {
    let mut out = String::new();
    archive
        .by_name(name)
        .unwrap_or_else(|_| panic!("missing part {name}"))
        .read_to_string(&mut out)
        .expect("utf-8 part");
    out
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| a.unescape_value().expect("attr").into_owned())
}

fn parse_sheet_rows(xml: &str) -> Vec<Vec<SpecParsedCell>> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<SpecParsedCell>> = Vec::new();
    let mut cell: Option<SpecParsedCell> = None;
    let mut if_in_v = false;

    loop {
        match reader.read_event().expect("sheet xml") {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"row" => {
                rows.push(Vec::new());
            }
            Event::Start(e) if e.name().as_ref() == b"c" => {
                cell = Some(derive_cell(&e));
            }
            Event::Empty(e) if e.name().as_ref() == b"c" => {
                if let Some(row) = rows.last_mut() {
                    row.push(derive_cell(&e));
                }
            }
            Event::Start(e) if e.name().as_ref() == b"v" => if_in_v = true,
            Event::Text(t) if if_in_v => {
                if let Some(cell) = cell.as_mut() {
                    cell.v = Some(t.unescape().expect("text").into_owned());
                }
            }
            Event::End(e) if e.name().as_ref() == b"v" => if_in_v = false,
            Event::End(e) if e.name().as_ref() == b"c" => {
                if let (Some(row), Some(cell)) = (rows.last_mut(), cell.take()) {
                    row.push(cell);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    rows
}

fn derive_cell(e: &BytesStart<'_>) -> SpecParsedCell {
    SpecParsedCell {
        r: attr(e, b"r").expect("cell ref"),
        t: attr(e, b"t"),
        s: attr(e, b"s").map_or(0, |s| s.parse().expect("style index")),
        v: None,
    }
}

fn parse_shared_strings(xml: &str) -> (Vec<String>, usize) {
    let mut reader = Reader::from_str(xml);
    let mut l_strings = Vec::new();
    let mut n_count = 0;
    let mut c_current = String::new();
    let mut if_in_t = false;

    loop {
        match reader.read_event().expect("sst xml") {
            Event::Start(e) if e.name().as_ref() == b"sst" => {
                n_count = attr(&e, b"count").map_or(0, |c| c.parse().expect("count"));
            }
            Event::Start(e) if e.name().as_ref() == b"si" => c_current.clear(),
            Event::Start(e) if e.name().as_ref() == b"t" => if_in_t = true,
            Event::Text(t) if if_in_t => c_current.push_str(&t.unescape().expect("text")),
            Event::End(e) if e.name().as_ref() == b"t" => if_in_t = false,
            Event::End(e) if e.name().as_ref() == b"si" => {
                l_strings.push(decode_ooxml_escapes(&c_current));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    (l_strings, n_count)
}

fn parse_styles(xml: &str) -> (Vec<u32>, HashMap<u32, String>) {
    let mut reader = Reader::from_str(xml);
    let mut l_xf_ids = Vec::new();
    let mut dict_num_fmts = HashMap::new();
    let mut if_in_cell_xfs = false;

    loop {
        match reader.read_event().expect("styles xml") {
            Event::Start(e) if e.name().as_ref() == b"cellXfs" => if_in_cell_xfs = true,
            Event::End(e) if e.name().as_ref() == b"cellXfs" => if_in_cell_xfs = false,
            Event::Empty(e) | Event::Start(e) if e.name().as_ref() == b"numFmt" => {
                let n_id: u32 = attr(&e, b"numFmtId").expect("id").parse().expect("id");
                dict_num_fmts.insert(n_id, attr(&e, b"formatCode").expect("code"));
            }
            Event::Empty(e) | Event::Start(e) if if_in_cell_xfs && e.name().as_ref() == b"xf" => {
                l_xf_ids.push(attr(&e, b"numFmtId").expect("id").parse().expect("id"));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    (l_xf_ids, dict_num_fmts)
}
