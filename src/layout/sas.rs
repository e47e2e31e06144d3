// src/layout/sas.rs

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument, trace, warn};

use super::types::{FieldKind, FieldSpec, Schema};
use crate::error::{IngestError, Result};

const BLOCK_OPENER: &str = "input";
const BLOCK_TERMINATOR: &str = ";";

/// `NAME [$]START-END`, e.g. `ADDLANG 1-1` or `CNTRLNUM $31-40`.
static FIELD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\w+)\s+(\$)?\s*(\d+)\s*-\s*(\d+)").expect("field line pattern is valid")
});

/// Parse the column-input statement(s) of a SAS program into a `Schema`.
///
/// Never fails: a layout with no `INPUT` block, or with no matching lines
/// inside it, yields an empty schema. Callers decide whether that is fatal
/// (see `Schema::validate`).
#[instrument(level = "debug", skip(contents), fields(content_len = contents.len()))]
pub fn parse(contents: &str) -> Schema {
    let mut fields = Vec::new();
    let mut in_block = false;
    let mut blocks = 0usize;

    for raw in contents.lines() {
        let line = raw.trim();

        if let Some(rest) = strip_opener(line) {
            in_block = true;
            blocks += 1;
            trace!("entered INPUT block");
            // `INPUT ADDLANG 1-1` declares a field on the opener line itself
            if let Some(spec) = parse_field_line(rest) {
                fields.push(spec);
            }
            continue;
        }
        if line == BLOCK_TERMINATOR {
            if in_block {
                trace!("left INPUT block");
            }
            in_block = false;
            continue;
        }
        if !in_block {
            continue;
        }

        match parse_field_line(line) {
            Some(spec) => fields.push(spec),
            None => trace!(line, "skipping non-field line"),
        }
    }

    debug!(blocks, fields = fields.len(), "finished layout parsing");
    Schema::new(fields)
}

/// Read a layout file from disk and parse it.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Schema> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
    Ok(parse(&contents))
}

/// Returns the remainder of the line when it opens an INPUT block.
fn strip_opener(line: &str) -> Option<&str> {
    let head = line.get(..BLOCK_OPENER.len())?;
    if !head.eq_ignore_ascii_case(BLOCK_OPENER) {
        return None;
    }
    let rest = &line[BLOCK_OPENER.len()..];
    // `INPUTTYPE 5-6` is a field, not an opener
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

fn parse_field_line(line: &str) -> Option<FieldSpec> {
    let caps = FIELD_LINE.captures(line)?;
    let name = caps.get(1)?.as_str().to_owned();
    let kind = if caps.get(2).is_some() {
        FieldKind::Text
    } else {
        FieldKind::Numeric
    };
    let (start, end) = match (caps[3].parse::<usize>(), caps[4].parse::<usize>()) {
        (Ok(s), Ok(e)) => (s, e),
        _ => {
            warn!(name = %name, "column positions out of range, skipping");
            return None;
        }
    };
    if start == 0 || end < start {
        warn!(name = %name, start, end, "invalid column range, skipping");
        return None;
    }
    trace!(name = %name, start, end, kind = kind.as_str(), "parsed field");
    Some(FieldSpec {
        name,
        start,
        end,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"/* NSSRN 2022 public use file */
DATA nssrn;
  INFILE 'nssrn_2022_puf_flat.txt' LRECL=2048;
  INPUT
    ADDLANG 1-1
    /* respondent identifiers */
    CNTRLNUM $31-40
    AGE_GP_PUF 2-3
    STATE_PUF $ 4-5
    RKRNWGTA 41-55
  ;
  LABEL ADDLANG = 'Speaks additional language';
  IF ADDLANG = 'L' THEN ADDLANG = .;
RUN;
"#;

    #[test]
    fn parses_fields_in_declaration_order() {
        let schema = parse(SAMPLE);
        assert_eq!(
            schema.column_names(),
            vec!["ADDLANG", "CNTRLNUM", "AGE_GP_PUF", "STATE_PUF", "RKRNWGTA"]
        );
        assert_eq!(
            schema.fields[1],
            FieldSpec {
                name: "CNTRLNUM".into(),
                start: 31,
                end: 40,
                kind: FieldKind::Text,
            }
        );
        assert_eq!(schema.fields[0].kind, FieldKind::Numeric);
        assert_eq!(schema.fields[3].kind, FieldKind::Text);
        assert_eq!(schema.fields[3].byte_range(), 3..5);
    }

    #[test]
    fn lines_outside_the_block_are_ignored() {
        // LABEL / IF lines after `;` look nothing like fields, but a stray
        // declaration-shaped line must not be picked up either.
        let text = "DUMMY 1-2\nINPUT\n  A 1-1\n;\nB 2-2\n";
        let schema = parse(text);
        assert_eq!(schema.column_names(), vec!["A"]);
    }

    #[test]
    fn opener_is_case_insensitive_and_may_carry_a_field() {
        let schema = parse("input X 1-3\n  Y $4-4\n;\n");
        assert_eq!(schema.column_names(), vec!["X", "Y"]);

        let schema = parse("Input\nZ 1-1\n;\n");
        assert_eq!(schema.column_names(), vec!["Z"]);

        let schema = parse("INPUT\n  INPUTTYPE 1-2\n  Q 3-3\n;\n");
        assert_eq!(schema.column_names(), vec!["INPUTTYPE", "Q"]);
    }

    #[test]
    fn missing_opener_yields_empty_schema() {
        let schema = parse("DATA x;\n  AGE 1-2\n  SEX $3-3\n;\nRUN;\n");
        assert!(schema.is_empty());
        assert!(schema.validate().is_err());

        assert!(parse("").is_empty());
        assert!(parse("INPUT\n;\n").is_empty());
    }

    #[test]
    fn invalid_ranges_are_skipped() {
        let schema = parse("INPUT\n  A 0-2\n  B 5-3\n  C 3-3\n;\n");
        assert_eq!(schema.column_names(), vec!["C"]);
    }

    #[test]
    fn n_declarations_give_n_fields() {
        for n in [1usize, 7, 250] {
            let mut text = String::from("INPUT\n");
            for i in 0..n {
                let start = i * 3 + 1;
                text.push_str(&format!("  V{} {}-{}\n", i, start, start + 2));
                // interleaved noise
                text.push_str("  * comment line;\n");
            }
            text.push_str(";\n");

            let schema = parse(&text);
            assert_eq!(schema.len(), n);
            for (i, f) in schema.iter().enumerate() {
                assert_eq!(f.name, format!("V{}", i));
                assert_eq!(f.start, i * 3 + 1);
            }
        }
    }

    #[test]
    fn every_block_contributes() {
        let schema = parse("INPUT\n A 1-1\n;\nRUN;\nINPUT\n B 2-2\n;\n");
        assert_eq!(schema.column_names(), vec!["A", "B"]);
    }

    #[test]
    fn parse_file_reads_from_disk() -> anyhow::Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(SAMPLE.as_bytes())?;
        let schema = parse_file(tmp.path())?;
        assert_eq!(schema.len(), 5);

        let missing = parse_file("/definitely/not/here.sas");
        assert!(matches!(missing, Err(IngestError::Io { .. })));
        Ok(())
    }
}
