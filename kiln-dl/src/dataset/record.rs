use crate::common::*;

/// Class names in label-index order.
pub const CLASS_NAMES: [&str; 2] = ["not brick kiln", "brick kiln"];

/// One dataset partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Valid => "valid",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The binary brick-kiln label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KilnLabel {
    NotBrickKiln,
    BrickKiln,
}

impl KilnLabel {
    /// Parse a label-map key.
    pub fn from_key(key: &str) -> Result<Self> {
        match key {
            "0" => Ok(Self::NotBrickKiln),
            "1" => Ok(Self::BrickKiln),
            other => bail!("unknown label id '{}'", other),
        }
    }

    pub fn class_index(&self) -> i64 {
        match self {
            Self::NotBrickKiln => 0,
            Self::BrickKiln => 1,
        }
    }

    pub fn class_name(&self) -> &'static str {
        CLASS_NAMES[self.class_index() as usize]
    }
}

/// One example: an image id joined with its tile path and label.
///
/// A `None` label records a manifest/label-map inconsistency. The record is
/// kept in place so the inconsistency surfaces at label lookup time instead
/// of shifting every later index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleRecord {
    pub image_id: String,
    pub filename: PathBuf,
    pub split: Split,
    pub label: Option<KilnLabel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_keys() {
        assert_eq!(KilnLabel::from_key("0").unwrap(), KilnLabel::NotBrickKiln);
        assert_eq!(KilnLabel::from_key("1").unwrap(), KilnLabel::BrickKiln);
        assert!(KilnLabel::from_key("2").is_err());
        assert_eq!(KilnLabel::BrickKiln.class_name(), "brick kiln");
    }
}
