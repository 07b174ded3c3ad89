use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

/// The concrete integer type backing a revision number.
///
/// Used at wiring time to check that a repository asks for the same
/// revision-number type the configured revision entity produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevisionNumberKind {
    I32,
    I64,
    U32,
    U64,
}

impl RevisionNumberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U32 => "u32",
            Self::U64 => "u64",
        }
    }
}

impl Display for RevisionNumberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown revision-number type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRevisionNumberKindError {
    pub value: String,
}

impl Display for ParseRevisionNumberKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown revision number type '{}', expected one of i32, i64, u32, u64",
            self.value
        )
    }
}

impl std::error::Error for ParseRevisionNumberKindError {}

impl FromStr for RevisionNumberKind {
    type Err = ParseRevisionNumberKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "i32" | "integer" | "int" => Ok(Self::I32),
            "i64" | "long" => Ok(Self::I64),
            "u32" => Ok(Self::U32),
            "u64" => Ok(Self::U64),
            _ => Err(ParseRevisionNumberKindError {
                value: s.to_string(),
            }),
        }
    }
}

/// A totally ordered integer usable as a revision number.
///
/// Audit stores persist revision numbers as `i64`; conversions in both
/// directions are checked and return `None` when the value does not fit.
pub trait RevisionNumber:
    Copy + Ord + Hash + Debug + Display + Send + Sync + 'static
{
    /// The kind tag for this type.
    const KIND: RevisionNumberKind;

    /// Converts a stored revision number into this type.
    fn from_i64(value: i64) -> Option<Self>;

    /// Converts this revision number into the stored representation.
    fn to_i64(self) -> Option<i64>;
}

macro_rules! impl_revision_number {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl RevisionNumber for $ty {
                const KIND: RevisionNumberKind = RevisionNumberKind::$kind;

                fn from_i64(value: i64) -> Option<Self> {
                    <$ty>::try_from(value).ok()
                }

                fn to_i64(self) -> Option<i64> {
                    i64::try_from(self).ok()
                }
            }
        )*
    };
}

impl_revision_number!(i32 => I32, i64 => I64, u32 => U32, u64 => U64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_are_bounds_checked() {
        assert_eq!(i32::from_i64(42), Some(42));
        assert_eq!(i32::from_i64(i64::from(i32::MAX) + 1), None);
        assert_eq!(u32::from_i64(-1), None);
        assert_eq!(u64::MAX.to_i64(), None);
        assert_eq!(7u64.to_i64(), Some(7));
    }

    #[test]
    fn kind_matches_type() {
        assert_eq!(<i32 as RevisionNumber>::KIND, RevisionNumberKind::I32);
        assert_eq!(<u64 as RevisionNumber>::KIND, RevisionNumberKind::U64);
    }

    #[test]
    fn kind_parses_common_spellings() {
        assert_eq!("i32".parse(), Ok(RevisionNumberKind::I32));
        assert_eq!("Long".parse(), Ok(RevisionNumberKind::I64));
        assert_eq!(" u32 ".parse(), Ok(RevisionNumberKind::U32));

        let err = "float".parse::<RevisionNumberKind>().unwrap_err();
        assert_eq!(err.value, "float");
    }
}
