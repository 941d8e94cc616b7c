//! Self-describing file and directory names.
//!
//! ```text
//! directory: obs=LICK,st=Fri_Aug_27_15:21:46_2021
//! file:      st=Fri_Aug_27_15:21:46_2021,dp=2,bpp=2,dome=0,module=14,seqno=0.pff
//! ```
//!
//! Both render from and parse back into their descriptor structs.
//! Timestamps are rendered in UTC with one-second resolution.

use crate::error::NameError;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use std::fmt;
use std::str::FromStr;

pub const TIMESTAMP_FORMAT: &str = "%a_%b_%d_%T_%Y";
pub const PFF_EXTENSION: &str = "pff";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataProduct {
    StaticMeta = 0,
    DynamicMeta = 1,
    Bit16Img = 2,
    Bit8Img = 3,
    PhImg = 4,
}

impl DataProduct {
    /// Products that get a file per module.
    pub const PER_MODULE: [DataProduct; 4] = [
        DataProduct::DynamicMeta,
        DataProduct::Bit16Img,
        DataProduct::Bit8Img,
        DataProduct::PhImg,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(DataProduct::StaticMeta),
            1 => Some(DataProduct::DynamicMeta),
            2 => Some(DataProduct::Bit16Img),
            3 => Some(DataProduct::Bit8Img),
            4 => Some(DataProduct::PhImg),
            _ => None,
        }
    }

    /// Bytes per pixel recorded in the file name (0 for metadata).
    pub fn bytes_per_pixel(self) -> u8 {
        match self {
            DataProduct::StaticMeta | DataProduct::DynamicMeta => 0,
            DataProduct::Bit16Img | DataProduct::PhImg => 2,
            DataProduct::Bit8Img => 1,
        }
    }
}

fn format_ts(t: &DateTime<Utc>) -> impl fmt::Display + '_ {
    t.format(TIMESTAMP_FORMAT)
}

fn parse_ts(key: &'static str, value: &str) -> Result<DateTime<Utc>, NameError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|_| NameError::BadValue {
            key,
            value: value.to_string(),
        })
}

fn parse_num<T: FromStr>(key: &'static str, value: &str) -> Result<T, NameError> {
    value.parse().map_err(|_| NameError::BadValue {
        key,
        value: value.to_string(),
    })
}

/// Splits `k1=v1,k2=v2` into pairs.
fn pairs(name: &str) -> impl Iterator<Item = Result<(&str, &str), NameError>> {
    name.split(',').map(|piece| {
        piece
            .split_once('=')
            .ok_or_else(|| NameError::BadComponent(piece.to_string()))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirnameInfo {
    pub observatory: String,
    pub start_time: DateTime<Utc>,
}

impl DirnameInfo {
    /// Fails when `observatory` is empty or holds a character that would
    /// break the `obs=..,st=..` directory name.
    pub fn new(
        observatory: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Result<Self, NameError> {
        let observatory = observatory.into();
        if observatory.is_empty() || observatory.contains([',', '=', '/', '\\']) {
            return Err(NameError::BadValue {
                key: "obs",
                value: observatory,
            });
        }
        Ok(Self {
            observatory,
            start_time: start_time.trunc_subsecs(0),
        })
    }
}

impl fmt::Display for DirnameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs={},st={}", self.observatory, format_ts(&self.start_time))
    }
}

impl FromStr for DirnameInfo {
    type Err = NameError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let mut observatory = None;
        let mut start_time = None;
        for pair in pairs(name) {
            match pair? {
                ("obs", v) => observatory = Some(v.to_string()),
                ("st", v) => start_time = Some(parse_ts("st", v)?),
                (k, _) => return Err(NameError::UnknownKey(k.to_string())),
            }
        }
        Ok(DirnameInfo {
            observatory: observatory.ok_or(NameError::MissingKey("obs"))?,
            start_time: start_time.ok_or(NameError::MissingKey("st"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameInfo {
    pub start_time: DateTime<Utc>,
    pub data_product: DataProduct,
    pub bytes_per_pixel: u8,
    pub dome: u32,
    pub module: u16,
    pub seqno: u32,
}

impl FilenameInfo {
    /// First file of a data product for a module.
    pub fn new(start_time: DateTime<Utc>, data_product: DataProduct, dome: u32, module: u16) -> Self {
        Self {
            start_time: start_time.trunc_subsecs(0),
            data_product,
            bytes_per_pixel: data_product.bytes_per_pixel(),
            dome,
            module,
            seqno: 0,
        }
    }

    /// Descriptor of the file that replaces this one on rotation.
    pub fn successor(&self, start_time: DateTime<Utc>) -> Self {
        Self {
            start_time: start_time.trunc_subsecs(0),
            seqno: self.seqno + 1,
            ..self.clone()
        }
    }
}

impl fmt::Display for FilenameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "st={},dp={},bpp={},dome={},module={},seqno={}.{}",
            format_ts(&self.start_time),
            self.data_product.id(),
            self.bytes_per_pixel,
            self.dome,
            self.module,
            self.seqno,
            PFF_EXTENSION
        )
    }
}

impl FromStr for FilenameInfo {
    type Err = NameError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let stem = name
            .strip_suffix(PFF_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or(NameError::BadExtension(PFF_EXTENSION))?;

        let mut start_time = None;
        let mut data_product = None;
        let mut bytes_per_pixel = None;
        let mut dome = None;
        let mut module = None;
        let mut seqno = None;

        for pair in pairs(stem) {
            match pair? {
                ("st", v) => start_time = Some(parse_ts("st", v)?),
                ("dp", v) => {
                    let id: u8 = parse_num("dp", v)?;
                    data_product = Some(DataProduct::from_id(id).ok_or_else(|| {
                        NameError::BadValue {
                            key: "dp",
                            value: v.to_string(),
                        }
                    })?);
                }
                ("bpp", v) => bytes_per_pixel = Some(parse_num("bpp", v)?),
                ("dome", v) => dome = Some(parse_num("dome", v)?),
                ("module", v) => module = Some(parse_num("module", v)?),
                ("seqno", v) => seqno = Some(parse_num("seqno", v)?),
                (k, _) => return Err(NameError::UnknownKey(k.to_string())),
            }
        }

        Ok(FilenameInfo {
            start_time: start_time.ok_or(NameError::MissingKey("st"))?,
            data_product: data_product.ok_or(NameError::MissingKey("dp"))?,
            bytes_per_pixel: bytes_per_pixel.ok_or(NameError::MissingKey("bpp"))?,
            dome: dome.ok_or(NameError::MissingKey("dome"))?,
            module: module.ok_or(NameError::MissingKey("module"))?,
            seqno: seqno.ok_or(NameError::MissingKey("seqno"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 8, 27, 15, 21, 46).unwrap()
    }

    #[test]
    fn dirname_renders_and_parses() {
        let d = DirnameInfo::new("LICK", t0()).unwrap();
        let s = d.to_string();
        assert_eq!(s, "obs=LICK,st=Fri_Aug_27_15:21:46_2021");
        assert_eq!(s.parse::<DirnameInfo>().unwrap(), d);
    }

    #[test]
    fn observatory_must_not_break_the_dirname() {
        for obs in ["", "LICK,st=x", "a=b", "../up", "a\\b"] {
            assert_eq!(
                DirnameInfo::new(obs, t0()),
                Err(NameError::BadValue {
                    key: "obs",
                    value: obs.to_string()
                }),
                "{obs:?}"
            );
        }
        assert!(DirnameInfo::new("Palomar-2", t0()).is_ok());
    }

    #[test]
    fn filename_renders_and_parses() {
        let f = FilenameInfo::new(t0(), DataProduct::Bit16Img, 0, 14);
        let s = f.to_string();
        assert_eq!(s, "st=Fri_Aug_27_15:21:46_2021,dp=2,bpp=2,dome=0,module=14,seqno=0.pff");
        assert_eq!(s.parse::<FilenameInfo>().unwrap(), f);
    }

    #[test]
    fn successor_bumps_seqno_and_time() {
        let f = FilenameInfo::new(t0(), DataProduct::PhImg, 1, 3);
        let later = t0() + chrono::Duration::seconds(90);
        let g = f.successor(later);
        assert_eq!(g.seqno, 1);
        assert_eq!(g.start_time, later);
        assert_eq!((g.data_product, g.dome, g.module), (f.data_product, f.dome, f.module));
        assert!(g.to_string().ends_with("seqno=1.pff"));
    }

    #[test]
    fn subsecond_start_times_are_truncated() {
        let t = t0() + chrono::Duration::milliseconds(750);
        let f = FilenameInfo::new(t, DataProduct::Bit8Img, 0, 1);
        assert_eq!(f.to_string().parse::<FilenameInfo>().unwrap(), f);
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert_eq!(
            "st=Fri_Aug_27_15:21:46_2021,dp=2".parse::<FilenameInfo>(),
            Err(NameError::BadExtension("pff"))
        );
        assert_eq!(
            "st=Fri_Aug_27_15:21:46_2021,dp=9,bpp=2,dome=0,module=1,seqno=0.pff"
                .parse::<FilenameInfo>(),
            Err(NameError::BadValue {
                key: "dp",
                value: "9".into()
            })
        );
        assert_eq!(
            "obs=LICK".parse::<DirnameInfo>(),
            Err(NameError::MissingKey("st"))
        );
        assert_eq!(
            "obs=LICK,when=now".parse::<DirnameInfo>(),
            Err(NameError::UnknownKey("when".into()))
        );
        assert!(matches!(
            "obs".parse::<DirnameInfo>(),
            Err(NameError::BadComponent(_))
        ));
    }
}
