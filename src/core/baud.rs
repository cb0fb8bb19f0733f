//! Baud rate name table
//!
//! Maps the textual rates accepted on the command line to termios speed
//! constants. Unknown names fall back to [`DEFAULT_BAUD`].

use nix::sys::termios::BaudRate;

/// Speed used when no rate is given or the given name is unknown
pub const DEFAULT_BAUD: BaudRate = BaudRate::B115200;

/// Textual name of [`DEFAULT_BAUD`]
pub const DEFAULT_BAUD_NAME: &str = "115200";

const SPEEDS: &[(&str, BaudRate)] = &[
    ("0", BaudRate::B0),
    ("50", BaudRate::B50),
    ("75", BaudRate::B75),
    ("110", BaudRate::B110),
    ("134", BaudRate::B134),
    ("150", BaudRate::B150),
    ("200", BaudRate::B200),
    ("300", BaudRate::B300),
    ("600", BaudRate::B600),
    ("1200", BaudRate::B1200),
    ("2400", BaudRate::B2400),
    ("4800", BaudRate::B4800),
    ("9600", BaudRate::B9600),
    ("19200", BaudRate::B19200),
    ("38400", BaudRate::B38400),
    ("57600", BaudRate::B57600),
    ("115200", BaudRate::B115200),
    ("230400", BaudRate::B230400),
    ("460800", BaudRate::B460800),
    ("500000", BaudRate::B500000),
    ("576000", BaudRate::B576000),
    ("921600", BaudRate::B921600),
    ("1000000", BaudRate::B1000000),
    ("1152000", BaudRate::B1152000),
    ("1500000", BaudRate::B1500000),
    ("2000000", BaudRate::B2000000),
    ("2500000", BaudRate::B2500000),
    ("3000000", BaudRate::B3000000),
    ("3500000", BaudRate::B3500000),
    ("4000000", BaudRate::B4000000),
];

/// Resolve an optional rate name, falling back to the default.
///
/// Returns the speed together with the matched table name, or `None`
/// for the name when the default was used because nothing matched.
pub fn resolve(name: Option<&str>) -> (BaudRate, Option<&'static str>) {
    name.and_then(|n| SPEEDS.iter().find(|(entry, _)| *entry == n))
        .map(|(entry, rate)| (*rate, Some(*entry)))
        .unwrap_or((DEFAULT_BAUD, None))
}

/// Name of a speed constant, if it is in the table
pub fn name_of(rate: BaudRate) -> Option<&'static str> {
    SPEEDS.iter().find(|(_, r)| *r == rate).map(|(n, _)| *n)
}

/// All rate names in ascending order
pub fn names() -> impl Iterator<Item = &'static str> {
    SPEEDS.iter().map(|(n, _)| *n)
}

/// Render the table three names per line, as shown in the usage text
pub fn table() -> String {
    let mut out = String::new();
    for (i, name) in names().enumerate() {
        out.push_str("   ");
        out.push_str(name);
        if i % 3 == 2 {
            out.push('\n');
        }
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_complete() {
        assert_eq!(names().count(), 30);
        assert_eq!(names().next(), Some("0"));
        assert_eq!(names().last(), Some("4000000"));
    }

    #[test]
    fn test_resolve_known_rates() {
        assert_eq!(resolve(Some("9600")), (BaudRate::B9600, Some("9600")));
        assert_eq!(resolve(Some("4000000")), (BaudRate::B4000000, Some("4000000")));
        assert_eq!(resolve(Some("0")), (BaudRate::B0, Some("0")));
    }

    #[test]
    fn test_resolve_defaults() {
        assert_eq!(resolve(None), (BaudRate::B115200, None));
        assert_eq!(resolve(Some("999999")), (BaudRate::B115200, None));
        assert_eq!(resolve(Some("")), (BaudRate::B115200, None));
        assert_eq!(resolve(Some("9600")), (BaudRate::B9600, Some("9600")));
    }

    #[test]
    fn test_name_of() {
        assert_eq!(name_of(DEFAULT_BAUD), Some(DEFAULT_BAUD_NAME));
        assert_eq!(name_of(BaudRate::B1800), None);
    }

    #[test]
    fn test_table_layout() {
        let table = table();
        let first = table.lines().next().unwrap();
        assert_eq!(first, "   0   50   75");
        assert_eq!(table.lines().count(), 10);
    }
}
