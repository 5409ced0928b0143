use std::collections::BTreeMap;

use thiserror::Error;

/// Sample-name suffixes that attach to the family announced by `# TYPE`.
const FAMILY_SUFFIXES: &[&str] = &["_total", "_sum", "_count", "_bucket", "_created"];

#[derive(Error, Debug)]
#[error("exposition parse error at line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// One decoded sample line from the exposition text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Metric family the sample belongs to (`http_requests` for
    /// `http_requests_total`).
    pub family: String,
    /// The sample's own name as written on the wire.
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Parses the metric-exposition text grammar into samples.
///
/// `# TYPE` lines announce the current family; `# HELP` and other comments
/// are skipped. Sample timestamps on the wire are ignored; the caller stamps
/// samples with the fetch time.
pub fn parse_exposition(text: &str) -> Result<Vec<RawSample>, ParseError> {
    let mut samples = Vec::new();
    let mut current_family: Option<String> = None;

    for (i, raw_line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw_line.trim_end_matches('\r').trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            let mut parts = comment.trim_start().splitn(3, char::is_whitespace);
            if parts.next() == Some("TYPE") {
                if let Some(name) = parts.next() {
                    current_family = Some(name.to_string());
                }
            }
            continue;
        }

        let (name, labels, value) = parse_sample_line(line, line_no)?;
        let family = family_for(&name, current_family.as_deref());
        samples.push(RawSample {
            family,
            name,
            labels,
            value,
        });
    }
    Ok(samples)
}

fn family_for(name: &str, current: Option<&str>) -> String {
    if let Some(family) = current {
        if name == family {
            return family.to_string();
        }
        if let Some(rest) = name.strip_prefix(family) {
            if FAMILY_SUFFIXES.contains(&rest) {
                return family.to_string();
            }
        }
    }
    name.to_string()
}

type SampleParts = (String, BTreeMap<String, String>, f64);

fn parse_sample_line(line: &str, line_no: usize) -> Result<SampleParts, ParseError> {
    let err = |message: String| ParseError {
        line: line_no,
        message,
    };

    let name_end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == ':'))
        .unwrap_or(line.len());
    if name_end == 0 {
        return Err(err(format!("expected metric name, got '{line}'")));
    }
    let name = &line[..name_end];
    let mut rest = line[name_end..].trim_start();

    let mut labels = BTreeMap::new();
    if let Some(after_brace) = rest.strip_prefix('{') {
        let (parsed, remainder) = parse_labels(after_brace, line_no)?;
        labels = parsed;
        rest = remainder.trim_start();
    }

    let mut value_parts = rest.split_whitespace();
    let value_text = value_parts
        .next()
        .ok_or_else(|| err("missing sample value".to_string()))?;
    let value: f64 = value_text
        .parse()
        .map_err(|_| err(format!("invalid sample value '{value_text}'")))?;
    // An optional trailing timestamp is tolerated and dropped

    Ok((name.to_string(), labels, value))
}

fn parse_labels(
    body: &str,
    line_no: usize,
) -> Result<(BTreeMap<String, String>, &str), ParseError> {
    let err = |message: String| ParseError {
        line: line_no,
        message,
    };

    let mut labels = BTreeMap::new();
    let mut chars = body.char_indices().peekable();

    loop {
        // Skip separators and detect the closing brace
        while let Some(&(_, c)) = chars.peek() {
            if c == ',' || c.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }
        match chars.peek() {
            Some(&(idx, '}')) => {
                return Ok((labels, &body[idx + 1..]));
            }
            None => return Err(err("unterminated label set".to_string())),
            _ => {}
        }

        // Label name up to '='
        let start = chars.peek().map(|&(i, _)| i).unwrap();
        let mut eq_idx = None;
        for (idx, c) in chars.by_ref() {
            if c == '=' {
                eq_idx = Some(idx);
                break;
            }
        }
        let eq_idx = eq_idx.ok_or_else(|| err("label without '='".to_string()))?;
        let key = body[start..eq_idx].trim().to_string();
        if key.is_empty() {
            return Err(err("empty label name".to_string()));
        }

        // Quoted value with escape sequences
        match chars.next() {
            Some((_, '"')) => {}
            _ => return Err(err(format!("label '{key}' value is not quoted"))),
        }
        let mut value = String::new();
        let mut closed = false;
        while let Some((_, c)) = chars.next() {
            match c {
                '"' => {
                    closed = true;
                    break;
                }
                '\\' => match chars.next() {
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => return Err(err("dangling escape in label value".to_string())),
                },
                other => value.push(other),
            }
        }
        if !closed {
            return Err(err(format!("unterminated value for label '{key}'")));
        }
        labels.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_gauge_lines() {
        let text = "\
# HELP node_load1 1m load average.
# TYPE node_load1 gauge
node_load1 0.21
";
        let samples = parse_exposition(text).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].family, "node_load1");
        assert_eq!(samples[0].name, "node_load1");
        assert!(samples[0].labels.is_empty());
        assert_eq!(samples[0].value, 0.21);
    }

    #[test]
    fn parses_labels_with_escapes() {
        let text = r#"path_total{path="C:\\files",msg="say \"hi\"\n"} 2"#;
        let samples = parse_exposition(text).unwrap();
        assert_eq!(samples[0].labels["path"], "C:\\files");
        assert_eq!(samples[0].labels["msg"], "say \"hi\"\n");
        assert_eq!(samples[0].value, 2.0);
    }

    #[test]
    fn counter_total_samples_attach_to_announced_family() {
        let text = "\
# TYPE http_requests counter
http_requests_total{method=\"get\"} 7
http_requests_created{method=\"get\"} 1.7e9
";
        let samples = parse_exposition(text).unwrap();
        assert_eq!(samples[0].family, "http_requests");
        assert_eq!(samples[0].name, "http_requests_total");
        assert_eq!(samples[1].family, "http_requests");
    }

    #[test]
    fn histogram_series_share_one_family() {
        let text = "\
# TYPE req_duration histogram
req_duration_bucket{le=\"0.1\"} 3
req_duration_bucket{le=\"+Inf\"} 5
req_duration_sum 0.6
req_duration_count 5
";
        let samples = parse_exposition(text).unwrap();
        assert!(samples.iter().all(|s| s.family == "req_duration"));
        assert_eq!(samples[1].labels["le"], "+Inf");
    }

    #[test]
    fn special_float_values_parse() {
        let text = "up +Inf\ndown -Inf\nmissing NaN\n";
        let samples = parse_exposition(text).unwrap();
        assert_eq!(samples[0].value, f64::INFINITY);
        assert_eq!(samples[1].value, f64::NEG_INFINITY);
        assert!(samples[2].value.is_nan());
    }

    #[test]
    fn trailing_timestamp_is_dropped() {
        let samples = parse_exposition("metric_a 12 1700000000000\n").unwrap();
        assert_eq!(samples[0].value, 12.0);
    }

    #[test]
    fn unrelated_names_start_their_own_family() {
        let text = "\
# TYPE node_cpu counter
node_cpu_total 1
other_metric 2
";
        let samples = parse_exposition(text).unwrap();
        assert_eq!(samples[0].family, "node_cpu");
        assert_eq!(samples[1].family, "other_metric");
    }

    #[test]
    fn malformed_lines_error_with_position() {
        let err = parse_exposition("good 1\nbad{open=\"x\" 1\n").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse_exposition("novalue\n").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
