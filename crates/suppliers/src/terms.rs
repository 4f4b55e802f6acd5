use core::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use galley_core::DomainError;

/// Payment terms agreed with a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaymentTerms {
    #[serde(rename = "COD")]
    Cod,
    #[serde(rename = "NET_7")]
    Net7,
    #[serde(rename = "NET_15")]
    Net15,
    #[default]
    #[serde(rename = "NET_30")]
    Net30,
    #[serde(rename = "NET_60")]
    Net60,
    #[serde(rename = "NET_90")]
    Net90,
}

impl PaymentTerms {
    /// Days between bill date and due date.
    pub fn offset_days(self) -> u64 {
        match self {
            PaymentTerms::Cod => 0,
            PaymentTerms::Net7 => 7,
            PaymentTerms::Net15 => 15,
            PaymentTerms::Net30 => 30,
            PaymentTerms::Net60 => 60,
            PaymentTerms::Net90 => 90,
        }
    }

    pub fn due_date(self, bill_date: NaiveDate) -> NaiveDate {
        // Saturates at the calendar's end instead of failing.
        bill_date
            .checked_add_days(Days::new(self.offset_days()))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentTerms::Cod => "COD",
            PaymentTerms::Net7 => "NET_7",
            PaymentTerms::Net15 => "NET_15",
            PaymentTerms::Net30 => "NET_30",
            PaymentTerms::Net60 => "NET_60",
            PaymentTerms::Net90 => "NET_90",
        }
    }
}

impl core::fmt::Display for PaymentTerms {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentTerms {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COD" => Ok(PaymentTerms::Cod),
            "NET_7" => Ok(PaymentTerms::Net7),
            "NET_15" => Ok(PaymentTerms::Net15),
            "NET_30" => Ok(PaymentTerms::Net30),
            "NET_60" => Ok(PaymentTerms::Net60),
            "NET_90" => Ok(PaymentTerms::Net90),
            other => Err(DomainError::validation(format!(
                "unknown payment terms: {other}"
            ))),
        }
    }
}
