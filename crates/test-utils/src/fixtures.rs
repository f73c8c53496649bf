//! Bulletin fixtures with known expected values.
//!
//! Times in the expectations are UTC.

use chrono::{DateTime, TimeZone, Utc};

/// Filename carrying a complete timestamp (2019-05-05T10:20:13Z).
pub const TAF_FILENAME: &str = "TAF_20190505_102013_12332319";

/// Filename pattern matching [`TAF_FILENAME`] with timestamp groups.
pub const TAF_FILENAME_PATTERN: &str =
    r"^TAF_(?P<yyyy>\d{4})(?P<MM>\d{2})(?P<dd>\d{2})_(?P<hh>\d{2})(?P<mm>\d{2})(?P<ss>\d{2})_\d{8}$";

/// Processing time used with the TAF fixtures.
pub fn taf_processing_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 5, 5, 10, 21, 20).unwrap()
}

/// One normal GTS bulletin with a single TAF for EFKE.
pub const TAF_BULLETIN: &str = "ZCZC\n\
FTFI33 EFPP 020500\n\
TAF EFKE 020532Z 0206/0312 05005KT 9999 -SHRA BKN004\n\
      BECMG 0206/0208 SCT015 BKN020=\n\
NNNN\n";

/// The same TAF in a second delayed bulletin (BBB `RRB`).
pub const DELAYED_TAF_BULLETIN: &str = "ZCZC\n\
FTFI33 EFPP 020500 RRB\n\
TAF EFKE 020532Z 0206/0312 05005KT 9999 -SHRA BKN004=\n\
NNNN\n";

/// Two bulletins: a TAF for EFKE and a test bulletin under `FTXX42`.
pub const TAF_AND_TEST_BULLETINS: &str = "ZCZC\n\
FTFI33 EFPP 020500\n\
TAF EFKE 020532Z 0206/0312 05005KT 9999 -SHRA BKN004=\n\
NNNN\n\
ZCZC\n\
FTXX42 EFPP 020500\n\
TAF EFXX 020532Z 0206/0312 05005KT CAVOK=\n\
NNNN\n";

/// Text that contains no bulletin or message at all.
pub const EMPTY_CONTENT: &str = "ZCZC\nNNNN\n";

pub mod expected {
    use super::*;

    pub const STATION: &str = "EFKE";
    pub const HEADING: &str = "FTFI33 EFPP 020500";

    pub fn message_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 5, 2, 5, 32, 0).unwrap()
    }

    pub fn valid_from() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 5, 2, 6, 0, 0).unwrap()
    }

    pub fn valid_to() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 5, 3, 12, 0, 0).unwrap()
    }
}
