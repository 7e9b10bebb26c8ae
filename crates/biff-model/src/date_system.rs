use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Workbook date system used to interpret serial date values.
///
/// - `Excel1900` (the default; includes the Lotus 1-2-3 leap year bug)
/// - `Excel1904` (selected by a non-zero `DATEMODE` record)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DateSystem {
    #[default]
    #[serde(rename = "excel1900")]
    Excel1900,
    #[serde(rename = "excel1904")]
    Excel1904,
}

impl DateSystem {
    /// Interpret a `DATEMODE` record flag (`1` selects the 1904 system).
    pub const fn from_datemode(flag: u16) -> Self {
        if flag == 0 {
            DateSystem::Excel1900
        } else {
            DateSystem::Excel1904
        }
    }

    /// Convert a serial date number into a calendar date-time.
    ///
    /// Returns `None` for negative, non-finite, or out-of-range serials. In the 1900 system the
    /// fictitious 1900-02-29 (serial 60) is reported as 1900-02-28.
    pub fn to_datetime(self, serial: f64) -> Option<NaiveDateTime> {
        if !serial.is_finite() || serial < 0.0 || serial > 2_958_466.0 {
            return None;
        }

        let mut days = serial.trunc() as i64;
        let millis = ((serial - serial.trunc()) * MILLIS_PER_DAY).round() as i64;

        let epoch = match self {
            DateSystem::Excel1904 => NaiveDate::from_ymd_opt(1904, 1, 1)?,
            DateSystem::Excel1900 if days >= 61 => NaiveDate::from_ymd_opt(1899, 12, 30)?,
            DateSystem::Excel1900 => {
                if days == 60 {
                    days = 59;
                }
                NaiveDate::from_ymd_opt(1899, 12, 31)?
            }
        };

        epoch
            .and_hms_opt(0, 0, 0)?
            .checked_add_signed(Duration::days(days))?
            .checked_add_signed(Duration::milliseconds(millis))
    }
}
