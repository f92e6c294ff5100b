//! On-disk layout of a table directory.
//!
//! ```text
//! <output_root>/<name>/<name>.parquet/            committed table
//! <output_root>/<name>/<name>.parquet/year=2018/artist_id=AR1/part-00000.parquet
//! <output_root>/<name>/.<name>.parquet.staging/   table being written
//! <output_root>/<name>/.<name>.parquet.replaced/  previous table during commit
//! ```

use std::path::PathBuf;

/// Directory name used for a null or empty partition value.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// File name of the single data file in each partition directory.
pub const PART_FILE: &str = "part-00000.parquet";

pub(crate) fn table_dir(name: &str) -> PathBuf {
    PathBuf::from(name).join(format!("{name}.parquet"))
}

pub(crate) fn staging_dir(name: &str) -> PathBuf {
    PathBuf::from(name).join(format!(".{name}.parquet.staging"))
}

pub(crate) fn replaced_dir(name: &str) -> PathBuf {
    PathBuf::from(name).join(format!(".{name}.parquet.replaced"))
}

fn needs_escape(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
        )
}

/// Escape a partition column name or value for use as a path component.
///
/// Reserved characters become `%XX` (upper-case hex of the UTF-8 bytes).
pub fn escape_path_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if needs_escape(c) {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{b:02X}"));
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Relative directory of one partition, `col=value` per partition column.
pub fn partition_dir(columns: &[&str], values: &[Option<String>]) -> PathBuf {
    columns
        .iter()
        .zip(values)
        .map(|(col, value)| {
            let value = match value.as_deref() {
                None | Some("") => DEFAULT_PARTITION.to_string(),
                Some(v) => escape_path_name(v),
            };
            format!("{}={value}", escape_path_name(col))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_paths_derive_from_name() {
        assert_eq!(
            table_dir("songplays_table"),
            PathBuf::from("songplays_table/songplays_table.parquet")
        );
        assert_eq!(
            staging_dir("time_table"),
            PathBuf::from("time_table/.time_table.parquet.staging")
        );
    }

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape_path_name("AR1"), "AR1");
        assert_eq!(escape_path_name("a/b=c"), "a%2Fb%3Dc");
        assert_eq!(escape_path_name("50%"), "50%25");
        assert_eq!(escape_path_name("tab\there"), "tab%09here");
        assert_eq!(escape_path_name("Beyoncé"), "Beyoncé");
    }

    #[test]
    fn partition_dir_uses_default_for_null_and_empty() {
        let dir = partition_dir(
            &["year", "artist_id"],
            &[Some("2018".to_string()), None],
        );
        assert_eq!(dir, PathBuf::from(format!("year=2018/artist_id={DEFAULT_PARTITION}")));

        let dir = partition_dir(&["artist_id"], &[Some(String::new())]);
        assert_eq!(dir, PathBuf::from(format!("artist_id={DEFAULT_PARTITION}")));
    }
}
