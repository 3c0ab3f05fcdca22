//! Value Objects for the catalog and warehouse

use serde::{Deserialize, Serialize};
use std::fmt;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub const MAX_LEN: usize = 64;

    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(SkuError::TooLong); }
        if let Some(c) = value.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))) {
            return Err(SkuError::InvalidChar(c));
        }
        Ok(Self(value))
    }

    /// Random SKU for products created without one.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}-{:08X}", prefix.to_uppercase(), rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SkuError { Empty, TooLong, InvalidChar(char) }
impl std::error::Error for SkuError {}
impl fmt::Display for SkuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "SKU empty"),
            Self::TooLong => write!(f, "SKU longer than {} characters", Sku::MAX_LEN),
            Self::InvalidChar(c) => write!(f, "SKU contains invalid character {c:?}"),
        }
    }
}

/// URL slug derived from a display name. Cyrillic is transliterated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    pub fn from_title(title: &str) -> Result<Self, SlugError> {
        let mut out = String::with_capacity(title.len());
        let mut pending_dash = false;
        let mut buf = [0u8; 4];
        for ch in title.chars().flat_map(char::to_lowercase) {
            let piece = if ch.is_ascii_alphanumeric() {
                &*ch.encode_utf8(&mut buf)
            } else if let Some(t) = transliterate(ch) {
                t
            } else {
                pending_dash = true;
                continue;
            };
            if piece.is_empty() { continue; }
            if pending_dash && !out.is_empty() { out.push('-'); }
            pending_dash = false;
            out.push_str(piece);
        }
        if out.is_empty() { return Err(SlugError::Empty); }
        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

fn transliterate(ch: char) -> Option<&'static str> {
    Some(match ch {
        'а' => "a", 'б' => "b", 'в' => "v", 'г' => "g", 'д' => "d", 'е' => "e", 'ё' => "e",
        'ж' => "zh", 'з' => "z", 'и' => "i", 'й' => "y", 'к' => "k", 'л' => "l", 'м' => "m",
        'н' => "n", 'о' => "o", 'п' => "p", 'р' => "r", 'с' => "s", 'т' => "t", 'у' => "u",
        'ф' => "f", 'х' => "h", 'ц' => "ts", 'ч' => "ch", 'ш' => "sh", 'щ' => "sch",
        'ъ' | 'ь' => "", 'ы' => "y", 'э' => "e", 'ю' => "yu", 'я' => "ya",
        'і' => "i", 'ї' => "yi", 'є' => "ye", 'ґ' => "g", 'ў' => "u", '\'' | 'ʼ' => "",
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SlugError { Empty }
impl std::error::Error for SlugError {}
impl fmt::Display for SlugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Name produces an empty slug") }
}

/// Non-negative stock count
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    /// Largest count a stock column can hold.
    pub const MAX: u32 = i32::MAX as u32;

    pub fn try_from_i32(value: i32) -> Option<Self> { u32::try_from(value).ok().map(Self) }
    pub fn as_i32(&self) -> i32 { i32::try_from(self.0).unwrap_or(i32::MAX) }
    /// `None` past [`Quantity::MAX`].
    pub fn add(&self, other: u32) -> Option<Self> { self.0.checked_add(other).filter(|v| *v <= Self::MAX).map(Self) }
    pub fn subtract(&self, other: u32) -> Option<Self> { self.0.checked_sub(other).map(Self) }
}
