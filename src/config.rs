//! Tag configuration and CSV ingestion.
//!
//! The simulator is driven by a tabular configuration with one header row and
//! five columns per data row:
//!
//! | Column | Meaning |
//! |--------|---------|
//! | `tagAddress` | `DB<n>,REAL<offset>`, optionally quoted |
//! | `minValue` | lower waveform bound |
//! | `maxValue` | upper waveform bound |
//! | `step` | value change per update |
//! | `periodMillis` | milliseconds between updates |
//!
//! Ingestion degrades gracefully: a malformed row is skipped with a warning
//! and the remaining rows are still processed, and an unreadable file yields
//! an empty descriptor list instead of an error. The simulator then starts
//! with a minimal configuration rather than aborting.
//!
//! # Example
//!
//! ```
//! use s7_regsim::config::read_csv;
//!
//! let csv = "\
//! tagAddress,minValue,maxValue,step,periodMillis
//! \"DB101,REAL0\",0,100,5,1000
//! \"DB101,REAL4\",-10,10,0.5,500
//! ";
//! let tags = read_csv(csv.as_bytes());
//! assert_eq!(tags.len(), 2);
//! assert_eq!(tags[0].db, 101);
//! assert_eq!(tags[1].offset, 4);
//! ```

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};

use crate::area::Area;
use crate::error::{Result, SimError};

/// Immutable description of one simulated tag, supplied by configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TagDescriptor {
    /// Data block number the tag lives in.
    pub db: u16,
    /// Byte offset of the REAL value within the data block.
    pub offset: usize,
    /// Lower waveform bound.
    pub min: f32,
    /// Upper waveform bound.
    pub max: f32,
    /// Value change applied per update.
    pub step: f32,
    /// Time between value updates.
    pub period: Duration,
}

impl TagDescriptor {
    /// Creates a descriptor with the period given in milliseconds.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_regsim::TagDescriptor;
    ///
    /// let tag = TagDescriptor::new(101, 0, 0.0, 100.0, 5.0, 1000);
    /// assert_eq!(tag.address(), "DB101,REAL0");
    /// ```
    pub fn new(db: u16, offset: usize, min: f32, max: f32, step: f32, period_ms: u64) -> Self {
        Self {
            db,
            offset,
            min,
            max,
            step,
            period: Duration::from_millis(period_ms),
        }
    }

    /// The area this tag is bound to.
    pub fn area(&self) -> Area {
        Area::Db(self.db)
    }

    /// The tag address in `DB<n>,REAL<offset>` form.
    pub fn address(&self) -> String {
        format!("DB{},REAL{}", self.db, self.offset)
    }

    /// Checks that the descriptor can drive a waveform.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidDescriptor`] if the bounds are not finite,
    /// `min > max`, the step is not a positive finite number, or the period
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(SimError::invalid_descriptor(
                self.address(),
                "bounds must be finite",
            ));
        }
        if self.min > self.max {
            return Err(SimError::invalid_descriptor(
                self.address(),
                format!("min {} exceeds max {}", self.min, self.max),
            ));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(SimError::invalid_descriptor(
                self.address(),
                "step must be a positive finite number",
            ));
        }
        if self.period.is_zero() {
            return Err(SimError::invalid_descriptor(
                self.address(),
                "period must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Parses a tag address of the form `DB<n>,REAL<offset>`.
///
/// Stray quote characters are discarded, matching what configuration tools
/// emit when they re-quote fields.
///
/// # Errors
///
/// Returns [`SimError::InvalidDescriptor`] if the address does not follow
/// the `DB<n>,REAL<offset>` form or the numbers do not parse.
///
/// # Example
///
/// ```
/// use s7_regsim::config::parse_tag_address;
///
/// assert_eq!(parse_tag_address("DB101,REAL8").unwrap(), (101, 8));
/// assert_eq!(parse_tag_address("\"DB5,REAL0\"").unwrap(), (5, 0));
/// assert!(parse_tag_address("M0.0").is_err());
/// ```
pub fn parse_tag_address(tag: &str) -> Result<(u16, usize)> {
    let clean: String = tag.chars().filter(|c| *c != '"').collect();
    let clean = clean.trim();

    let body = clean
        .strip_prefix("DB")
        .ok_or_else(|| SimError::invalid_descriptor(tag, "expected 'DB' prefix"))?;
    let (db_str, real_part) = body
        .split_once(',')
        .ok_or_else(|| SimError::invalid_descriptor(tag, "expected ',' between DB and REAL"))?;
    let offset_str = real_part
        .trim()
        .strip_prefix("REAL")
        .ok_or_else(|| SimError::invalid_descriptor(tag, "expected 'REAL' prefix on offset"))?;

    let db = db_str
        .trim()
        .parse::<u16>()
        .map_err(|e| SimError::invalid_descriptor(tag, format!("bad DB number: {e}")))?;
    let offset = offset_str
        .parse::<usize>()
        .map_err(|e| SimError::invalid_descriptor(tag, format!("bad REAL offset: {e}")))?;

    Ok((db, offset))
}

/// Reads tag descriptors from CSV input.
///
/// The first row is treated as a header. Malformed rows are skipped with a
/// warning; valid rows are still collected. The tag address column may be
/// quoted (one field) or unquoted (in which case the embedded comma splits
/// it into two fields and the row carries six fields in total).
pub fn read_csv<R: Read>(reader: R) -> Vec<TagDescriptor> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut tags = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        // Row 1 is the header.
        let line = index as u64 + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("{}", SimError::config_parse(line, e.to_string()));
                continue;
            }
        };
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        match parse_record(&record, line) {
            Ok(tag) => tags.push(tag),
            Err(e) => warn!("skipping config row: {e}"),
        }
    }

    info!("loaded {} tag descriptors from configuration", tags.len());
    tags
}

/// Loads tag descriptors from a CSV file.
///
/// An unreadable file is reported with a warning and yields an empty list,
/// so the caller can fall back to a minimal configuration.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Vec<TagDescriptor> {
    let path = path.as_ref();
    match std::fs::File::open(path) {
        Ok(file) => read_csv(file),
        Err(e) => {
            warn!(
                "could not open config file '{}': {e}; starting with empty configuration",
                path.display()
            );
            Vec::new()
        }
    }
}

fn parse_record(record: &csv::StringRecord, line: u64) -> Result<TagDescriptor> {
    // A quoted tag address arrives as one field; an unquoted one splits on
    // its embedded comma and the row carries six fields.
    let (tag_str, values_at) = match record.len() {
        5 => (record[0].to_string(), 1),
        6 => (format!("{},{}", &record[0], &record[1]), 2),
        n => {
            return Err(SimError::config_parse(
                line,
                format!("expected 5 fields, got {n}"),
            ))
        }
    };

    let (db, offset) = parse_tag_address(&tag_str)
        .map_err(|e| SimError::config_parse(line, e.to_string()))?;

    let mut floats = [0.0f32; 3];
    for (slot, name) in ["minValue", "maxValue", "step"].iter().enumerate() {
        let field = &record[values_at + slot];
        floats[slot] = field.parse::<f32>().map_err(|e| {
            SimError::config_parse(line, format!("bad {name} '{field}': {e}"))
        })?;
    }
    let period_field = &record[values_at + 3];
    let period_ms = period_field.parse::<u64>().map_err(|e| {
        SimError::config_parse(line, format!("bad periodMillis '{period_field}': {e}"))
    })?;

    Ok(TagDescriptor {
        db,
        offset,
        min: floats[0],
        max: floats[1],
        step: floats[2],
        period: Duration::from_millis(period_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_tag_address() {
        assert_eq!(parse_tag_address("DB101,REAL0").unwrap(), (101, 0));
        assert_eq!(parse_tag_address("DB1,REAL200").unwrap(), (1, 200));
        assert_eq!(parse_tag_address("\"DB7,REAL16\"").unwrap(), (7, 16));
        assert_eq!(parse_tag_address(" DB2 , REAL4 ").unwrap(), (2, 4));
    }

    #[test]
    fn test_parse_tag_address_rejects_malformed() {
        assert!(parse_tag_address("M0.0").is_err());
        assert!(parse_tag_address("DB101").is_err());
        assert!(parse_tag_address("DB101,INT0").is_err());
        assert!(parse_tag_address("DBx,REAL0").is_err());
        assert!(parse_tag_address("DB101,REAL-4").is_err());
    }

    #[test]
    fn test_read_csv_quoted_and_unquoted() {
        let csv = "\
tagAddress,minValue,maxValue,step,periodMillis
\"DB101,REAL0\",0,100,5,1000
DB101,REAL4,-10,10,0.5,500
";
        let tags = read_csv(csv.as_bytes());
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0], TagDescriptor::new(101, 0, 0.0, 100.0, 5.0, 1000));
        assert_eq!(tags[1], TagDescriptor::new(101, 4, -10.0, 10.0, 0.5, 500));
    }

    #[test]
    fn test_read_csv_skips_malformed_rows() {
        let csv = "\
tagAddress,minValue,maxValue,step,periodMillis
\"DB1,REAL0\",0,10,1,100
\"DB1,REAL4\",0,10,1,100
not-a-tag,0,10,1,100
\"DB1,REAL8\",zero,10,1,100
\"DB1,REAL12\",0,10,1,100
\"DB1,REAL16\",0,10,1,100
\"DB1,REAL20\",0,10,1,100
\"DB1,REAL24\",0,10,1,100
\"DB1,REAL28\",0,10,1,100
\"DB1,REAL32\",0,10,1,100
\"DB1,REAL36\",0,10,1,100
\"DB1,REAL40\",0,10,1,100
";
        let tags = read_csv(csv.as_bytes());
        // 10 valid rows survive 2 malformed ones
        assert_eq!(tags.len(), 10);
    }

    #[test]
    fn test_read_csv_skips_blank_rows() {
        let csv = "\
tagAddress,minValue,maxValue,step,periodMillis
\"DB1,REAL0\",0,10,1,100

\"DB1,REAL4\",0,10,1,100
";
        let tags = read_csv(csv.as_bytes());
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_read_csv_empty_input() {
        let tags = read_csv("tagAddress,minValue,maxValue,step,periodMillis\n".as_bytes());
        assert!(tags.is_empty());
    }

    #[test]
    fn test_load_csv_missing_file_degrades_to_empty() {
        let tags = load_csv("/nonexistent/address.csv");
        assert!(tags.is_empty());
    }

    #[test]
    fn test_load_csv_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tagAddress,minValue,maxValue,step,periodMillis").unwrap();
        writeln!(file, "\"DB5,REAL0\",1,2,0.1,250").unwrap();
        file.flush().unwrap();

        let tags = load_csv(file.path());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].db, 5);
        assert_eq!(tags[0].period, Duration::from_millis(250));
    }

    #[test]
    fn test_validate() {
        assert!(TagDescriptor::new(1, 0, 0.0, 10.0, 1.0, 100).validate().is_ok());
        // min above max
        assert!(TagDescriptor::new(1, 0, 10.0, 0.0, 1.0, 100)
            .validate()
            .is_err());
        // zero and negative step
        assert!(TagDescriptor::new(1, 0, 0.0, 10.0, 0.0, 100)
            .validate()
            .is_err());
        assert!(TagDescriptor::new(1, 0, 0.0, 10.0, -1.0, 100)
            .validate()
            .is_err());
        // zero period
        assert!(TagDescriptor::new(1, 0, 0.0, 10.0, 1.0, 0).validate().is_err());
        // non-finite bound
        assert!(TagDescriptor::new(1, 0, f32::NAN, 10.0, 1.0, 100)
            .validate()
            .is_err());
    }

    #[test]
    fn test_equal_min_max_is_valid() {
        // A constant tag is allowed; the waveform just stays clamped.
        assert!(TagDescriptor::new(1, 0, 5.0, 5.0, 1.0, 100).validate().is_ok());
    }
}
