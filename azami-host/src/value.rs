//! ターゲット上の構造化された値
//!
//! ホストのシンボルテーブルが解釈した「型付きの値」をエンジン側へ渡すための
//! 表現です。アーキテクチャプロファイルはこのレコードに対して
//! 「フィールドが存在すれば値を返す」問い合わせを行います。

/// ターゲット上の値
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 整数値（ポインタを含む）
    Scalar(u64),
    /// 文字列値
    Str(String),
    /// 名前付きフィールドを持つレコード
    Record(ValueRecord),
    /// 配列
    Array(Vec<Value>),
}

impl Value {
    /// 整数値として取得する
    pub fn as_scalar(&self) -> Option<u64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// 文字列として取得する
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// レコードとして取得する
    pub fn as_record(&self) -> Option<&ValueRecord> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// レコードのフィールドを取得する
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_record().and_then(|r| r.field(name))
    }

    /// 配列の要素を取得する
    pub fn index(&self, i: usize) -> Option<&Value> {
        match self {
            Value::Array(items) => items.get(i),
            _ => None,
        }
    }
}

/// 名前付きフィールドの集まり
///
/// フィールドは挿入順を保持します。フィールド数は小さい前提なので
/// 線形探索で十分です。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueRecord {
    fields: Vec<(String, Value)>,
}

impl ValueRecord {
    /// 空のレコードを作成する
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// フィールドを追加したレコードを返す（ビルダー用）
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// フィールドを追加する（同名フィールドは上書き）
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// フィールドを取得する
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// フィールドが存在するか確認する
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// フィールドが存在し整数値であればその値を返す
    pub fn scalar(&self, name: &str) -> Option<u64> {
        self.field(name).and_then(Value::as_scalar)
    }

    /// フィールド数を取得する
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// レコードが空かどうか
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_field_access() {
        let rec = ValueRecord::new()
            .with_field("psp", Value::Scalar(0x2000_1000))
            .with_field("name", Value::Str("main".into()));

        assert!(rec.has_field("psp"));
        assert!(!rec.has_field("sp"));
        assert_eq!(rec.scalar("psp"), Some(0x2000_1000));
        assert_eq!(rec.scalar("name"), None);
        assert_eq!(rec.field("name").and_then(Value::as_str), Some("main"));
    }

    #[test]
    fn test_nested_field_and_index() {
        let cpu = Value::Record(ValueRecord::new().with_field("current", Value::Scalar(0x3000)));
        let kernel = Value::Record(
            ValueRecord::new()
                .with_field("cpus", Value::Array(vec![cpu]))
                .with_field("threads", Value::Scalar(0x3100)),
        );

        let current = kernel
            .field("cpus")
            .and_then(|c| c.index(0))
            .and_then(|c| c.field("current"))
            .and_then(Value::as_scalar);
        assert_eq!(current, Some(0x3000));
        assert_eq!(kernel.field("threads").and_then(Value::as_scalar), Some(0x3100));
    }

    #[test]
    fn test_insert_overwrites() {
        let mut rec = ValueRecord::new();
        rec.insert("state", Value::Scalar(0));
        rec.insert("state", Value::Scalar(4));
        assert_eq!(rec.scalar("state"), Some(4));
        assert_eq!(rec.len(), 1);
    }
}
