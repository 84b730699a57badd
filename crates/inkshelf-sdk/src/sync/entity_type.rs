//! 可同步的实体类型

use std::str::FromStr;

/// 实体类型（受控枚举，新增需本地存储与远端表同步升级）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Bookmark,
    ReadingProgress,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bookmark => "bookmark",
            Self::ReadingProgress => "reading_progress",
        }
    }

    /// 远端表名
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Bookmark => "bookmarks",
            Self::ReadingProgress => "reading_progress",
        }
    }

    /// 本地 KV 中集合所在的键
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Bookmark => crate::storage::kv::keys::BOOKMARKS,
            Self::ReadingProgress => crate::storage::kv::keys::READING_PROGRESS,
        }
    }
}

impl FromStr for EntityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bookmark" => Ok(Self::Bookmark),
            "reading_progress" => Ok(Self::ReadingProgress),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn entity_type_as_str_and_from_str() {
        assert_eq!(EntityType::Bookmark.as_str(), "bookmark");
        assert_eq!(EntityType::ReadingProgress.as_str(), "reading_progress");
        assert_eq!(EntityType::from_str("bookmark").unwrap(), EntityType::Bookmark);
        assert_eq!(
            EntityType::from_str("reading_progress").unwrap(),
            EntityType::ReadingProgress
        );
        assert!(EntityType::from_str("comment").is_err());
    }

    #[test]
    fn table_names_are_plural_rows() {
        assert_eq!(EntityType::Bookmark.table_name(), "bookmarks");
        assert_eq!(EntityType::ReadingProgress.table_name(), "reading_progress");
    }
}
