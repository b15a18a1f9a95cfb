use super::error::{Error, ErrorKind};

/*
Catalog seed files are plain CSV, one record per line:

name,measurement_unit
абрикосовое варенье,г
"salt, coarse",g

A first line equal to the column names is skipped. Fields may be quoted; "" inside quotes is a literal quote.
*/

/// Splits seed text into records of exactly `columns.len()` trimmed fields.
pub fn parse_rows(text: &str, columns: &[&str]) -> Result<Vec<Vec<String>>, Error> {
    let mut rows = vec![];

    for (number, line) in text.lines().enumerate() {
        let line = line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            continue;
        }

        let fields = split_line(line).ok_or_else(|| {
            ErrorKind::Validation.new(&format!("Line {}: unterminated quote", number + 1))
        })?;

        if number == 0 && is_header(&fields, columns) {
            continue;
        }

        if fields.len() != columns.len() {
            return Err(ErrorKind::Validation.new(&format!(
                "Line {}: expected {} fields, found {}",
                number + 1,
                columns.len(),
                fields.len()
            )));
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(ErrorKind::Validation.new(&format!("Line {}: empty field", number + 1)));
        }

        rows.push(fields);
    }

    Ok(rows)
}

fn is_header(fields: &[String], columns: &[&str]) -> bool {
    fields.len() == columns.len()
        && fields
            .iter()
            .zip(columns)
            .all(|(field, column)| field.eq_ignore_ascii_case(column))
}

fn split_line(line: &str) -> Option<Vec<String>> {
    let mut fields = vec![];
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    quoted = false;
                }
            }
            '"' if current.trim().is_empty() => {
                current.clear();
                quoted = true;
            }
            ',' if !quoted => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }

    if quoted {
        return None;
    }
    fields.push(current.trim().to_string());

    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[&str] = &["name", "measurement_unit"];

    #[test]
    fn skips_matching_header() {
        let rows = parse_rows("name,measurement_unit\nsugar,g\n\nmilk,ml\n", COLUMNS).unwrap();

        assert_eq!(
            rows,
            vec![
                vec![String::from("sugar"), String::from("g")],
                vec![String::from("milk"), String::from("ml")],
            ]
        );
    }

    #[test]
    fn keeps_first_line_without_header() {
        let rows = parse_rows("абрикосовое варенье,г\n", COLUMNS).unwrap();

        assert_eq!(rows[0][0], "абрикосовое варенье");
        assert_eq!(rows[0][1], "г");
    }

    #[test]
    fn handles_quoted_fields() {
        let rows = parse_rows("\"salt, coarse\",g\n\"say \"\"cheese\"\"\",pcs", COLUMNS).unwrap();

        assert_eq!(rows[0][0], "salt, coarse");
        assert_eq!(rows[1][0], "say \"cheese\"");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_rows("sugar\n", COLUMNS).is_err());
        assert!(parse_rows("sugar,g,extra\n", COLUMNS).is_err());
        assert!(parse_rows("\"sugar,g\n", COLUMNS).is_err());
        assert!(parse_rows("sugar,\n", COLUMNS).is_err());
    }
}
