//! ラベル表（分類器の出力順序）とお題に使えるラベルの管理
//!
//! 順序は分類器の学習時の順序と完全に一致している必要があります。

use std::collections::HashSet;

use crate::error::LabelTableError;

/// 分類器が出力する全クラス（学習時の順序）
pub const CLASS_NAMES: [&str; 15] = [
    "airplane",
    "apple",
    "bicycle",
    "book",
    "car",
    "cat",
    "crown",
    "eiffel Tower",
    "fish",
    "helicopter",
    "house",
    "moustache",
    "star",
    "sword",
    "spider",
];

/// 分類器は出力するがお題には出さないラベル
pub const DISABLED_PROMPTS: [&str; 1] = ["spider"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
    promptable: Vec<bool>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self {
            labels: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            promptable: CLASS_NAMES
                .iter()
                .map(|name| !DISABLED_PROMPTS.contains(name))
                .collect(),
        }
    }
}

impl LabelTable {
    /// ラベル表を作成
    ///
    /// - ラベルが空、または重複がある場合はエラー
    /// - `disabled` にラベル表にない名前が含まれる場合もエラー
    pub fn new(labels: Vec<String>, disabled: &[String]) -> Result<Self, LabelTableError> {
        if labels.is_empty() {
            return Err(LabelTableError::Empty);
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(LabelTableError::Duplicate(label.clone()));
            }
        }

        if let Some(unknown) = disabled.iter().find(|d| !seen.contains(d.as_str())) {
            return Err(LabelTableError::UnknownDisabled(unknown.clone()));
        }

        let promptable = labels.iter().map(|l| !disabled.contains(l)).collect();
        Ok(Self { labels, promptable })
    }

    /// 全ラベルをお題対象にしてラベル表を作成
    pub fn all_promptable<I, S>(labels: I) -> Result<Self, LabelTableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(labels.into_iter().map(Into::into).collect(), &[])
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// クラスインデックスからラベルを取得
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// ラベルからクラスインデックスを取得
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn is_promptable(&self, label: &str) -> bool {
        self.index_of(label)
            .map(|i| self.promptable[i])
            .unwrap_or(false)
    }

    /// お題に使えるラベル（ラベル表の順序のまま）
    pub fn promptable_labels(&self) -> Vec<String> {
        self.labels
            .iter()
            .zip(&self.promptable)
            .filter(|(_, enabled)| **enabled)
            .map(|(label, _)| label.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = LabelTable::default();
        assert_eq!(table.len(), 15);
        assert_eq!(table.label(0), Some("airplane"));
        assert_eq!(table.index_of("spider"), Some(14));
        assert!(!table.is_promptable("spider"));
        assert!(table.is_promptable("cat"));
        assert_eq!(table.promptable_labels().len(), 14);

        // 定数から作った表は検証付きの構築と一致する
        let validated = LabelTable::new(
            CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            &["spider".to_string()],
        )
        .unwrap();
        assert_eq!(validated, table);
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert_eq!(LabelTable::new(vec![], &[]), Err(LabelTableError::Empty));
        assert_eq!(
            LabelTable::all_promptable(["cat", "dog", "cat"]),
            Err(LabelTableError::Duplicate("cat".to_string()))
        );
        assert_eq!(
            LabelTable::new(vec!["cat".to_string()], &["dog".to_string()]),
            Err(LabelTableError::UnknownDisabled("dog".to_string()))
        );
    }

    #[test]
    fn test_unknown_label_is_not_promptable() {
        let table = LabelTable::all_promptable(["cat", "dog"]).unwrap();
        assert!(!table.is_promptable("fish"));
        assert_eq!(table.label(2), None);
    }
}
