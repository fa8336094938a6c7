//! Parsers for the scripted (`-H -p`) output of `zfs list` and `zfs get`.

use jmanager_core::error::{JailError, Result};

use super::store::{Record, ZfsProperty};

/// One record per non-empty line, tab separated, columns in `properties` order.
pub fn parse_list(output: &str, properties: &[ZfsProperty]) -> Result<Vec<Record>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() != properties.len() {
                return Err(JailError::store(
                    "list",
                    format!(
                        "expected {} columns, got {}: '{}'",
                        properties.len(),
                        columns.len(),
                        line
                    ),
                ));
            }
            Ok(properties
                .iter()
                .copied()
                .zip(columns.into_iter().map(str::to_string))
                .collect())
        })
        .collect()
}

/// `property<TAB>value` lines from `zfs get -o property,value`.
///
/// Exactly the requested properties must appear, each once.
pub fn parse_get(output: &str, properties: &[ZfsProperty]) -> Result<Record> {
    let mut record = Record::new();
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        let (property, value) = line.split_once('\t').ok_or_else(|| {
            JailError::store("get", format!("malformed output line: '{}'", line))
        })?;
        let property: ZfsProperty = property
            .parse()
            .map_err(|e| JailError::store("get", format!("{}", e)))?;
        if !properties.contains(&property) {
            return Err(JailError::store(
                "get",
                format!("unexpected property '{}' in output", property),
            ));
        }
        if record.insert(property, value.to_string()).is_some() {
            return Err(JailError::store(
                "get",
                format!("property '{}' reported twice", property),
            ));
        }
    }
    if let Some(missing) = properties.iter().find(|p| !record.contains_key(*p)) {
        return Err(JailError::store(
            "get",
            format!("property '{}' missing from output", missing),
        ));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let output = "zroot/jails\t1024\t2048\t96\t/usr/local/jails\n\
                      zroot/jails/13.2-RELEASE_amd64\t512\t2048\t512\t/usr/local/jails/13.2-RELEASE_amd64\n";
        let records = parse_list(
            output,
            &[
                ZfsProperty::Name,
                ZfsProperty::Used,
                ZfsProperty::Avail,
                ZfsProperty::Refer,
                ZfsProperty::Mountpoint,
            ],
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][&ZfsProperty::Name], "zroot/jails/13.2-RELEASE_amd64");
        assert_eq!(records[0][&ZfsProperty::Used], "1024");
    }

    #[test]
    fn test_parse_list_empty_output() {
        assert!(parse_list("", &[ZfsProperty::Name]).unwrap().is_empty());
        assert!(parse_list("\n\n", &[ZfsProperty::Name]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_list_column_mismatch() {
        let err = parse_list("a\tb\n", &[ZfsProperty::Name]).unwrap_err();
        assert!(matches!(err, JailError::Store { .. }));
    }

    const ORIGIN_USED: [ZfsProperty; 2] = [ZfsProperty::Origin, ZfsProperty::Used];

    #[test]
    fn test_parse_get() {
        let record =
            parse_get("origin\tzroot/b@jmanager_base_jail\nused\t100\n", &ORIGIN_USED).unwrap();
        assert_eq!(record[&ZfsProperty::Origin], "zroot/b@jmanager_base_jail");
        assert_eq!(record[&ZfsProperty::Used], "100");
    }

    #[test]
    fn test_parse_get_rejects_garbage() {
        assert!(parse_get("no tabs here\n", &ORIGIN_USED).is_err());
        assert!(parse_get("compression\tlz4\n", &ORIGIN_USED).is_err());
    }

    #[test]
    fn test_parse_get_requires_every_property() {
        for output in ["", "origin\t-\n", "origin\t-\norigin\t-\nused\t1\n"] {
            let err = parse_get(output, &ORIGIN_USED).unwrap_err();
            assert!(matches!(err, JailError::Store { .. }), "{output:?}");
        }

        let err = parse_get("origin\t-\nmountpoint\t/jails\n", &[ZfsProperty::Origin])
            .unwrap_err();
        assert!(err.to_string().contains("unexpected property"));
    }
}
