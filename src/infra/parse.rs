use crate::domain::{ContainerRecord, InspectRecord};
use crate::error::{HarnessError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parses the fixed-column table printed by the orchestration CLI's
/// listing command into container records.
///
/// The table is column-aligned with runs of two or more spaces between
/// fields, and a long field (typically the ports column) wraps onto
/// indented continuation lines. Column windows are measured per row from
/// the row's first physical line, then continuation lines are sliced by
/// the same windows and folded back into their fields. Empty input is an
/// empty listing, not an error.
pub fn parse_listing(text: &str) -> Result<Vec<ContainerRecord>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let lines: Vec<&str> = text.lines().collect();
    let data_start = match lines
        .iter()
        .position(|l| !l.trim().is_empty() && l.trim().chars().all(|c| c == '-'))
    {
        Some(sep) => sep + 1,
        // Headerless output: tolerate it rather than demand the banner.
        None => 0,
    };

    let mut rows: Vec<Vec<&str>> = Vec::new();
    for line in &lines[data_start..] {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            if let Some(row) = rows.last_mut() {
                row.push(line);
                continue;
            }
        }
        rows.push(vec![line]);
    }

    // A headerless fallback still has to skip a title row if one is there.
    if data_start == 0 {
        if let Some(first) = rows.first() {
            let lowered = first[0].to_lowercase();
            if lowered.contains("name") && lowered.contains("state") {
                rows.remove(0);
            }
        }
    }

    rows.iter().map(|row| decolumnize(row)).collect()
}

/// Splits one multi-line row of column-aligned text into a container
/// record. The first line defines the column windows.
fn decolumnize(row: &[&str]) -> Result<ContainerRecord> {
    let first: Vec<char> = row[0].chars().collect();
    let windows = column_windows(&first);

    if windows.len() < 4 {
        return Err(HarnessError::parse("container listing row", row[0]));
    }

    let mut fields: Vec<String> = Vec::with_capacity(windows.len() - 1);
    for pair in windows.windows(2) {
        fields.push(slice_window(&first, pair[0], pair[1]));
    }

    for line in &row[1..] {
        let chars: Vec<char> = line.chars().collect();
        for (i, pair) in windows.windows(2).enumerate() {
            fields[i].push_str(&slice_window(&chars, pair[0], pair[1]));
        }
    }

    let fields: Vec<String> = fields.iter().map(|f| scrub(f)).collect();

    let ports = fields
        .get(3)
        .map(|f| {
            f.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(ContainerRecord::new(&fields[0], &fields[1], &fields[2], ports))
}

/// Cumulative char offsets of the column boundaries on a row's first
/// line: each column ends at the run of two or more spaces after it.
fn column_windows(first: &[char]) -> Vec<usize> {
    let mut windows = vec![0];
    let mut i = 0;

    while i < first.len() {
        // Walk to the end of the field text.
        while i < first.len() && !(first[i] == ' ' && first.get(i + 1) == Some(&' ')) {
            i += 1;
        }
        // Then past the separating gap.
        while i < first.len() && first[i] == ' ' {
            i += 1;
        }
        windows.push(i);
    }

    if *windows.last().unwrap() < first.len() {
        windows.push(first.len());
    }
    windows
}

fn slice_window(chars: &[char], start: usize, end: usize) -> String {
    if start >= chars.len() {
        return String::new();
    }
    chars[start..end.min(chars.len())].iter().collect()
}

/// Collapses the gaps the column fold leaves behind: runs of spaces, and
/// addresses split across a wrap boundary ("10.0.0. 1").
fn scrub(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut prev_space = false;
    for c in field.trim().chars() {
        if c == ' ' {
            prev_space = true;
            continue;
        }
        if prev_space {
            if !out.ends_with('.') && !out.is_empty() {
                out.push(' ');
            }
            prev_space = false;
        }
        out.push(c);
    }
    out
}

/// Parses the container runtime's `inspect` output, normalizing both
/// generations of the format: the modern array-of-objects shape and the
/// older bare-object shape. Anything else is an unrecognized-format
/// error rather than a raw decode error.
pub fn parse_inspect(text: &str) -> Result<Vec<InspectRecord>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|_| HarnessError::parse("inspect output (not valid JSON)", text))?;

    match value {
        Value::Array(items) => items.iter().map(inspect_record).collect(),
        Value::Object(_) => Ok(vec![inspect_record(&value)?]),
        _ => Err(HarnessError::parse("inspect output (unrecognized format)", text)),
    }
}

fn inspect_record(value: &Value) -> Result<InspectRecord> {
    let obj = value
        .as_object()
        .ok_or_else(|| HarnessError::parse("inspect entry", &value.to_string()))?;

    let id = obj
        .get("Id")
        .or_else(|| obj.get("ID"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let name = obj
        .get("Name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();

    if id.is_empty() && name.is_empty() {
        return Err(HarnessError::parse(
            "inspect entry (unrecognized format)",
            &value.to_string(),
        ));
    }

    // Older tool versions report State as a bare string instead of an
    // object with a Status field.
    let state = match obj.get("State") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(state)) => state
            .get("Status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    let settings = obj.get("NetworkSettings").and_then(Value::as_object);
    let ip_address = settings
        .and_then(|s| s.get("IPAddress"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut network_addresses = BTreeMap::new();
    if let Some(networks) = settings
        .and_then(|s| s.get("Networks"))
        .and_then(Value::as_object)
    {
        for (net, detail) in networks {
            if let Some(ip) = detail.get("IPAddress").and_then(Value::as_str) {
                network_addresses.insert(net.clone(), ip.to_string());
            }
        }
    }

    Ok(InspectRecord {
        id,
        name,
        state,
        ip_address,
        network_addresses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StateKind;

    const LISTING: &str = "\
     Name                   Command                State       Ports
--------------------------------------------------------------------------
app_consul_1    /bin/start -bootstrap -ui     Up          8300/tcp, 8500/tcp
app_nginx_1     nginx -g daemon off;          Up          0.0.0.0:80->80/tcp
app_app_1       /bin/containerpilot node      Restarting
";

    #[test]
    fn test_parse_listing_fields() {
        let records = parse_listing(LISTING).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].name, "app_consul_1");
        assert_eq!(records[0].command, "/bin/start -bootstrap -ui");
        assert!(records[0].state.is_running());
        assert_eq!(records[0].ports, vec!["8300/tcp", "8500/tcp"]);

        assert_eq!(records[2].name, "app_app_1");
        assert_eq!(records[2].state.kind(), StateKind::Restarting);
        assert!(records[2].ports.is_empty());
    }

    #[test]
    fn test_parse_listing_rejoins_wrapped_rows() {
        let listing = "\
    Name               Command          State     Ports
--------------------------------------------------------------
app_nginx_1    nginx -g daemon off;     Up        0.0.0.0:80->80/tcp,
                                                  0.0.0.0:443->443/tcp
";
        let records = parse_listing(listing).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].ports,
            vec!["0.0.0.0:80->80/tcp", "0.0.0.0:443->443/tcp"]
        );
    }

    #[test]
    fn test_parse_listing_empty_input() {
        assert!(parse_listing("").unwrap().is_empty());
        assert!(parse_listing("  \n \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_listing_malformed_row_is_hard_error() {
        let listing = "\
    Name      Command     State    Ports
------------------------------------------
garbage-single-field
";
        let err = parse_listing(listing).unwrap_err();
        match err {
            HarnessError::Parse { sample, .. } => {
                assert!(sample.contains("garbage-single-field"))
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_listing_round_trip_is_loss_free() {
        let records = parse_listing(LISTING).unwrap();
        for record in &records {
            let rendered = format!(
                "{}  {}  {}  {}",
                record.name,
                record.command,
                record.state,
                record.ports.join(", ")
            );
            let reparsed = parse_listing(&rendered).unwrap();
            assert_eq!(reparsed.len(), 1);
            assert_eq!(&reparsed[0], record);
        }
    }

    #[test]
    fn test_parse_inspect_array_shape() {
        let json = r#"[{
            "Id": "deadbeef",
            "Name": "/app_consul_1",
            "State": {"Status": "running"},
            "NetworkSettings": {
                "IPAddress": "172.17.0.2",
                "Networks": {"app_default": {"IPAddress": "172.18.0.2"}}
            }
        }]"#;
        let records = parse_inspect(json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "app_consul_1");
        assert_eq!(records[0].state, "running");
        assert_eq!(records[0].ip_address.as_deref(), Some("172.17.0.2"));
        assert_eq!(
            records[0].network_addresses.get("app_default").map(String::as_str),
            Some("172.18.0.2")
        );
    }

    #[test]
    fn test_parse_inspect_legacy_object_shape() {
        let json = r#"{"ID": "deadbeef", "Name": "app_db_1", "State": "exited"}"#;
        let records = parse_inspect(json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "deadbeef");
        assert_eq!(records[0].state, "exited");
    }

    #[test]
    fn test_parse_inspect_rejects_unrecognized_shapes() {
        for bad in ["42", "\"a string\"", "[{\"unrelated\": true}]", "not json"] {
            let err = parse_inspect(bad).unwrap_err();
            assert!(matches!(err, HarnessError::Parse { .. }), "input: {bad}");
        }
    }
}
