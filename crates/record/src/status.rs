use crate::error::{Error, ErrorKind};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Normalizes a status string as written by older snapshot logs.
///
/// Accepts an enum-class prefix (`DownloadStatus.DOWNLOADED`), any casing, and
/// dashes or spaces in place of underscores.
fn sanitize(s: impl AsRef<str>) -> String {
    let s = s.as_ref().trim();
    let s = s.rsplit_once('.').map(|(_, variant)| variant).unwrap_or(s);
    s.to_uppercase().replace(['-', ' '], "_")
}

/// Where an asset is in the fetch lifecycle.
///
/// Moves forward through the fetch state machine:
/// `PENDING -> {EXISTS, DOWNLOADED, ERROR}`. [`NotSet`](Self::NotSet) is the
/// "unset" sentinel used by the merge rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DownloadStatus {
    #[default]
    NotSet,
    /// Name and destination derived; fetch not (yet) successful.
    Pending,
    /// Fetched during this or a previous run and present in storage.
    Downloaded,
    /// Already recorded in the canonical inventory; not fetched again.
    InDatabase,
    /// The destination file was already on disk; not fetched again.
    Exists,
    /// Derivation failed, or every fetch attempt failed.
    Error,
}
impl DownloadStatus {
    /// Returns the string written to snapshot logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSet => "NOT_SET",
            Self::Pending => "PENDING",
            Self::Downloaded => "DOWNLOADED",
            Self::InDatabase => "IN_DATABASE",
            Self::Exists => "EXISTS",
            Self::Error => "ERROR",
        }
    }

    /// Whether the asset is known to be in storage already.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Downloaded | Self::InDatabase | Self::Exists)
    }
}
impl FromStr for DownloadStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match sanitize(s).as_str() {
            "NOT_SET" | "NOTSET" | "" => Self::NotSet,
            "PENDING" => Self::Pending,
            "DOWNLOADED" => Self::Downloaded,
            "IN_DATABASE" | "INDATABASE" => Self::InDatabase,
            "EXISTS" => Self::Exists,
            "ERROR" => Self::Error,
            _ => exn::bail!(ErrorKind::ParseError {
                field: "dl_status",
                value: format!("unknown download status: {}", s)
            }),
        })
    }
}
impl Display for DownloadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// What the last run did to an asset's record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ModStatus {
    #[default]
    NotSet,
    New,
    Updated,
    Unchanged,
    Delete,
}
impl ModStatus {
    /// Returns the string written to snapshot logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSet => "MOD_NOT_SET",
            Self::New => "NEW",
            Self::Updated => "UPDATED",
            Self::Unchanged => "UNCHANGED",
            Self::Delete => "DELETE",
        }
    }
}
impl FromStr for ModStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match sanitize(s).as_str() {
            "MOD_NOT_SET" | "NOT_SET" | "NOTSET" | "" => Self::NotSet,
            "NEW" => Self::New,
            "UPDATED" => Self::Updated,
            "UNCHANGED" => Self::Unchanged,
            "DELETE" | "DELETED" => Self::Delete,
            _ => exn::bail!(ErrorKind::ParseError {
                field: "mod_status",
                value: format!("unknown modification status: {}", s)
            }),
        })
    }
}
impl Display for ModStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
