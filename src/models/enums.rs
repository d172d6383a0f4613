use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde wire name.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(DocType {
    Invoice => "invoice",
    Receipt => "receipt",
    Timesheet => "timesheet",
    OrgChart => "orgChart",
    ApprovalNote => "approvalNote",
    Unknown => "unknown",
});

str_enum!(ItemKind {
    Receipt => "receipt",
    Invoice => "invoice",
});

str_enum!(Decision {
    Approved => "approved",
    Rejected => "rejected",
    Unknown => "unknown",
});

str_enum!(ClassificationLabel {
    Allowed => "ALLOWED",
    Unallowable => "UNALLOWABLE",
    NeedsReview => "NEEDS_REVIEW",
    ReceiptRequired => "RECEIPT_REQUIRED",
});

str_enum!(MatchQuality {
    High => "high",
    Medium => "medium",
    Low => "low",
});

str_enum!(ProcessingMethod {
    PlainText => "plain_text",
    Tesseract => "tesseract",
    DocumentIntelligence => "document_intelligence",
    Llm => "llm",
    None => "none",
});

str_enum!(ClearScope {
    Gl => "gl",
    Docs => "docs",
    All => "all",
});

impl MatchQuality {
    /// Bucket a 0-100 match score.
    pub fn from_score(percent: f64) -> Self {
        if percent >= 85.0 {
            Self::High
        } else if percent >= 70.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}
