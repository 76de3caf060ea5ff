use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::borrow::Borrow;
use thiserror::Error;

/// A-share sub-market with its own listing and price-limit regime.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    /// Shanghai main board (600/601/603/605).
    #[display("sh_main")]
    ShMain,
    /// Shenzhen main board (000/001).
    #[display("sz_main")]
    SzMain,
    /// Shenzhen SME board (002).
    #[display("sz_sme")]
    SzSme,
    /// STAR market (688).
    #[display("star")]
    Star,
    /// ChiNext (300/301).
    #[display("chinext")]
    ChiNext,
}

impl Board {
    /// Classify a 6-digit code into its [`Board`] by prefix, if any matches.
    pub fn classify(digits: &str) -> Option<Self> {
        let prefix = digits.get(0..3)?;
        match prefix {
            "600" | "601" | "603" | "605" => Some(Self::ShMain),
            "000" | "001" => Some(Self::SzMain),
            "002" => Some(Self::SzSme),
            "688" => Some(Self::Star),
            "300" | "301" => Some(Self::ChiNext),
            _ => None,
        }
    }

    /// Exchange suffix carried by external data vendors for this board.
    pub fn exchange_suffix(&self) -> &'static str {
        match self {
            Self::ShMain | Self::Star => ".SH",
            Self::SzMain | Self::SzSme | Self::ChiNext => ".SZ",
        }
    }

    /// Whether the board trades on the Shanghai exchange (transfer fee applies).
    pub fn is_shanghai(&self) -> bool {
        matches!(self, Self::ShMain | Self::Star)
    }
}

/// Validated 6-digit A-share stock code.
///
/// Construction strips an optional exchange suffix (`.SH` / `.SZ`, or any
/// vendor decoration after the first `.`) and rejects anything that is not
/// six ASCII digits on a known [`Board`].
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, derive_more::Display,
)]
pub struct StockCode(SmolStr);

impl StockCode {
    /// Parse and validate a stock code, stripping any exchange suffix.
    pub fn parse<S>(input: S) -> Result<Self, InvalidStockCode>
    where
        S: AsRef<str>,
    {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(InvalidStockCode::Empty);
        }

        let digits = match raw.split_once('.') {
            Some((digits, _suffix)) => digits,
            None => raw,
        };

        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidStockCode::Malformed(raw.to_string()));
        }

        match Board::classify(digits) {
            Some(_) => Ok(Self(SmolStr::new(digits))),
            None => Err(InvalidStockCode::UnknownBoard(raw.to_string())),
        }
    }

    /// The [`Board`] this code is listed on.
    pub fn board(&self) -> Board {
        // Validated on construction, so classification cannot fail.
        match Board::classify(&self.0) {
            Some(board) => board,
            None => unreachable!("StockCode is validated on construction"),
        }
    }

    /// Code with its canonical exchange suffix re-attached, eg/ `600000.SH`.
    pub fn with_suffix(&self) -> SmolStr {
        format_smolstr!("{}{}", self.0, self.board().exchange_suffix())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::str::FromStr for StockCode {
    type Err = InvalidStockCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Borrow<str> for StockCode {
    fn borrow(&self) -> &str {
        self.0.borrow()
    }
}

impl AsRef<str> for StockCode {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl<'de> Deserialize<'de> for StockCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let code = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        StockCode::parse(code).map_err(serde::de::Error::custom)
    }
}

/// Failure to interpret an input string as a listed A-share code.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum InvalidStockCode {
    #[error("stock code is empty")]
    Empty,

    #[error("stock code must be 6 digits: {0}")]
    Malformed(String),

    #[error("stock code does not match a known board: {0}")]
    UnknownBoard(String),
}
