use crate::{LineError, Tally};
use std::fmt::{self, Display};

const SEPARATOR: &str = "##";

pub const DROID_TABLES: [&str; 18] = [
    "classification",
    "hits",
    "format",
    "version",
    "mimetype",
    "date",
    "positive-hits",
    "positive-format",
    "positive-mimetype",
    "positive-date",
    "tentative-hits",
    "tentative-format",
    "tentative-mimetype",
    "tentative-date",
    "unknown-mimetype",
    "unknown-date",
    "version-format",
    "version-mimetype",
];

pub const JHOVE_TABLES: [&str; 19] = [
    "valid",
    "wellformed",
    "format",
    "version",
    "module",
    "mimetype",
    "date",
    "valid-format",
    "valid-mimetype",
    "valid-module",
    "valid-date",
    "valid-wellformed",
    "wellformed-format",
    "wellformed-mimetype",
    "wellformed-module",
    "wellformed-date",
    "wellformed-valid",
    "invalid-mimetype",
    "unhandled-mimetype",
];

pub const JHOVE_SIZE_TABLES: [&str; 20] = [
    "valid",
    "wellformed",
    "module",
    "jhove-mimetype",
    "heritrix-mimetype",
    "size",
    "date",
    "valid-Heritrix-mimetype",
    "valid-Jhove-mimetype",
    "valid-module",
    "valid-date",
    "valid-wellformed",
    "wellformed-Jhove-mimetype",
    "wellformed-Heritrix-mimetype",
    "wellformed-module",
    "wellformed-date",
    "wellformed-valid",
    "heritrixMimetype-size",
    "date-size",
    "mimetype_jhove-heritrix",
];

/// Named tables printed in a fixed order, each followed by two empty lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    tables: Vec<Tally<u64>>,
    // running totals of the `size` table
    lines: u64,
    bytes: u64,
}

impl Tables {
    pub fn new(names: &[&str]) -> Self {
        Self {
            tables: names.iter().map(|name| Tally::new(*name)).collect(),
            lines: 0,
            bytes: 0,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tally<u64>> {
        self.tables.iter().find(|table| table.name() == name)
    }

    fn add(&mut self, name: &str, key: &str, value: u64) -> Result<(), LineError> {
        match self.tables.iter_mut().find(|table| table.name() == name) {
            Some(table) => table.add(key, value),
            None => Ok(()),
        }
    }

    fn count(&mut self, entries: &[(&str, &str)]) -> Result<(), LineError> {
        for (name, key) in entries {
            self.add(name, key, 1)?;
        }
        Ok(())
    }

    fn fits(&self, name: &str, key: &str, value: u64) -> bool {
        self.get(name)
            .and_then(|table| table.get(key))
            .unwrap_or_default()
            .checked_add(value)
            .is_some()
    }
}

impl Display for Tables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for table in &self.tables {
            write!(f, "{table}\n\n")?;
        }
        Ok(())
    }
}

/// split a `##` line, trailing empty fields are not counted
fn fields(line: &str, expected: usize) -> Result<Vec<&str>, LineError> {
    let mut fields: Vec<&str> = line.split(SEPARATOR).collect();
    while fields.last() == Some(&"") {
        fields.pop();
    }

    if fields.len() == expected {
        Ok(fields)
    } else {
        Err(LineError::FieldCount {
            expected,
            found: fields.len(),
        })
    }
}

/// only year, month and day of a timestamp
fn day(date: &str) -> String {
    date.chars().take(8).collect()
}

pub(crate) fn fold_droid(tables: &mut Tables, line: &str) -> Result<(), LineError> {
    let fields = fields(line, 6)?;
    let (classification, hits, format, version) = (fields[0], fields[1], fields[2], fields[3]);
    let mimetype = if fields[4].is_empty() { "null" } else { fields[4] };
    let date = day(fields[5]);
    let date = date.as_str();

    tables.count(&[
        ("classification", classification),
        ("hits", hits),
        ("format", format),
        ("version", version),
        ("mimetype", mimetype),
        ("date", date),
    ])?;

    if classification.eq_ignore_ascii_case("positive") {
        tables.count(&[
            ("positive-hits", hits),
            ("positive-format", format),
            ("positive-mimetype", mimetype),
            ("positive-date", date),
        ])?;
    } else if classification.eq_ignore_ascii_case("tentative") {
        tables.count(&[
            ("tentative-hits", hits),
            ("tentative-format", format),
            ("tentative-mimetype", mimetype),
            ("tentative-date", date),
        ])?;
    } else if classification.eq_ignore_ascii_case("not identified") {
        tables.count(&[("unknown-mimetype", mimetype), ("unknown-date", date)])?;
    }

    if !version.eq_ignore_ascii_case("null") {
        let with_format = format!("{format}, '{version}'");
        let with_mimetype = format!("{mimetype}, '{version}'");
        tables.count(&[
            ("version-format", with_format.as_str()),
            ("version-mimetype", with_mimetype.as_str()),
        ])?;
    }

    Ok(())
}

pub(crate) fn fold_jhove(tables: &mut Tables, line: &str) -> Result<(), LineError> {
    let fields = fields(line, 7)?;
    let (valid, wellformed, format, version, module, mimetype) =
        (fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]);
    let date = day(fields[6]);
    let date = date.as_str();

    tables.count(&[
        ("valid", valid),
        ("wellformed", wellformed),
        ("format", format),
        ("version", version),
        ("module", module),
        ("mimetype", mimetype),
        ("date", date),
    ])?;

    if valid.eq_ignore_ascii_case("valid") {
        tables.count(&[
            ("valid-format", format),
            ("valid-mimetype", mimetype),
            ("valid-module", module),
            ("valid-date", date),
            ("valid-wellformed", wellformed),
        ])?;
    } else if valid.eq_ignore_ascii_case("invalid") {
        tables.count(&[("invalid-mimetype", mimetype)])?;
    } else {
        tables.count(&[("unhandled-mimetype", mimetype)])?;
    }

    if wellformed.eq_ignore_ascii_case("wellformed") {
        tables.count(&[
            ("wellformed-format", format),
            ("wellformed-mimetype", mimetype),
            ("wellformed-module", module),
            ("wellformed-date", date),
            ("wellformed-valid", valid),
        ])?;
    }

    Ok(())
}

pub(crate) fn fold_jhove_size(tables: &mut Tables, line: &str) -> Result<(), LineError> {
    let fields = fields(line, 7)?;
    let (valid, wellformed, module, jhove_mimetype, heritrix_mimetype) =
        (fields[0], fields[1], fields[2], fields[3], fields[4]);
    let size: u64 = fields[5]
        .trim()
        .parse()
        .map_err(|_| LineError::InvalidNumber(fields[5].to_string()))?;
    let date = day(fields[6]);
    let date = date.as_str();

    // sums are checked up front so a bad line leaves no partial counts
    let bytes = tables
        .bytes
        .checked_add(size)
        .ok_or_else(|| LineError::Overflow("size".to_string()))?;
    for (name, key) in [("heritrixMimetype-size", heritrix_mimetype), ("date-size", date)] {
        if !tables.fits(name, key, size) {
            return Err(LineError::Overflow(key.to_string()));
        }
    }
    tables.add("heritrixMimetype-size", heritrix_mimetype, size)?;
    tables.add("date-size", date, size)?;

    tables.count(&[
        ("valid", valid),
        ("wellformed", wellformed),
        ("module", module),
        ("jhove-mimetype", jhove_mimetype),
        ("heritrix-mimetype", heritrix_mimetype),
        ("date", date),
    ])?;

    if valid.eq_ignore_ascii_case("valid") {
        tables.count(&[
            ("valid-Heritrix-mimetype", heritrix_mimetype),
            ("valid-Jhove-mimetype", jhove_mimetype),
            ("valid-module", module),
            ("valid-date", date),
            ("valid-wellformed", wellformed),
        ])?;
    }

    if wellformed.eq_ignore_ascii_case("wellformed") {
        tables.count(&[
            ("wellformed-Jhove-mimetype", jhove_mimetype),
            ("wellformed-Heritrix-mimetype", heritrix_mimetype),
            ("wellformed-module", module),
            ("wellformed-date", date),
            ("wellformed-valid", valid),
        ])?;
    }

    if !jhove_mimetype.eq_ignore_ascii_case("null") {
        let pair = format!("{jhove_mimetype} : {heritrix_mimetype}");
        tables.count(&[("mimetype_jhove-heritrix", pair.as_str())])?;
    }

    // one entry: number of sized lines and their total size
    tables.lines += 1;
    tables.bytes = bytes;
    let (lines, bytes) = (tables.lines, tables.bytes);
    if let Some(table) = tables.tables.iter_mut().find(|table| table.name() == "size") {
        table.reset(lines.to_string(), bytes);
    }

    Ok(())
}
