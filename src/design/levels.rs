use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use super::DesignError;

/// A single candidate level for an experiment variable
///
/// JSON integers map to `Integer`, other JSON numbers to `Float` and strings to
/// `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl LevelValue {
    /// Parse a command-line level, preferring integer, then float, then text
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(i) = raw.parse::<i64>() {
            LevelValue::Integer(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            LevelValue::Float(f)
        } else {
            LevelValue::Text(raw.to_string())
        }
    }
}

impl fmt::Display for LevelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelValue::Integer(i) => write!(f, "{i}"),
            LevelValue::Float(x) => write_float(f, *x),
            LevelValue::Text(s) => f.write_str(s),
        }
    }
}

/// Shortest round-trip form with a trailing ".0" on whole values, a signed
/// exponent of at least two digits (`1e+16`, `1e-05`) and lowercase `nan`
fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_nan() {
        return f.write_str("nan");
    }
    let repr = format!("{x:?}");
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            write!(f, "{mantissa}e{sign}{digits:0>2}")
        }
        None => f.write_str(&repr),
    }
}

impl From<i64> for LevelValue {
    fn from(value: i64) -> Self {
        LevelValue::Integer(value)
    }
}

impl From<f64> for LevelValue {
    fn from(value: f64) -> Self {
        LevelValue::Float(value)
    }
}

impl From<&str> for LevelValue {
    fn from(value: &str) -> Self {
        LevelValue::Text(value.to_string())
    }
}

/// A variable together with its ordered candidate levels
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub levels: Vec<LevelValue>,
}

/// Ordered mapping of variable name to candidate levels
///
/// Names are unique and keep the order in which they were supplied, including
/// when read from a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableLevels {
    variables: Vec<Variable>,
}

impl VariableLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variable, rejecting a name that is already present
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        levels: impl IntoIterator<Item = impl Into<LevelValue>>,
    ) -> Result<(), DesignError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DesignError::EmptyVariableName);
        }
        if self.variables.iter().any(|v| v.name == name) {
            return Err(DesignError::DuplicateVariable(name));
        }
        self.variables.push(Variable {
            name,
            levels: levels.into_iter().map(Into::into).collect(),
        });
        Ok(())
    }

    /// Builder-style variant of [`VariableLevels::insert`]
    pub fn with(
        mut self,
        name: impl Into<String>,
        levels: impl IntoIterator<Item = impl Into<LevelValue>>,
    ) -> Result<Self, DesignError> {
        self.insert(name, levels)?;
        Ok(self)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Number of combinations in the full factorial design, or `None` when it
    /// does not fit in a `usize`
    pub fn combination_count(&self) -> Option<usize> {
        if self.variables.iter().any(|v| v.levels.is_empty()) {
            return Some(0);
        }
        self.variables
            .iter()
            .try_fold(1usize, |acc, v| acc.checked_mul(v.levels.len()))
    }

    /// Parse a `name=level1,level2,...` command-line specification
    pub fn parse_var_spec(spec: &str) -> Result<(String, Vec<LevelValue>), DesignError> {
        let (name, levels) = spec
            .split_once('=')
            .ok_or_else(|| DesignError::InvalidVarSpec(spec.to_string()))?;

        let name = name.trim();
        if name.is_empty() {
            return Err(DesignError::InvalidVarSpec(spec.to_string()));
        }

        let levels = if levels.trim().is_empty() {
            Vec::new()
        } else {
            levels.split(',').map(LevelValue::parse).collect()
        };

        Ok((name.to_string(), levels))
    }

    /// Build from a list of `name=levels` specifications, in order
    pub fn from_var_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self, DesignError> {
        let mut levels = Self::new();
        for spec in specs {
            let (name, values) = Self::parse_var_spec(spec.as_ref())?;
            levels.insert(name, values)?;
        }
        Ok(levels)
    }

    /// Load variable levels from a JSON object file such as
    /// `{"Buff1": [3], "CapA": [2, 4]}`
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read design file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse design file {}", path.display()))
    }
}

impl<'de> Deserialize<'de> for VariableLevels {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, MapAccess, Visitor};

        struct VariableLevelsVisitor;

        impl<'de> Visitor<'de> for VariableLevelsVisitor {
            type Value = VariableLevels;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object mapping variable names to lists of levels")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut levels = VariableLevels::new();
                while let Some(name) = map.next_key::<String>()? {
                    let values: Vec<LevelValue> = map.next_value()?;
                    levels.insert(name, values).map_err(de::Error::custom)?;
                }
                Ok(levels)
            }
        }

        deserializer.deserialize_map(VariableLevelsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_level_display() {
        assert_eq!(LevelValue::Integer(3).to_string(), "3");
        assert_eq!(LevelValue::Float(2.5).to_string(), "2.5");
        assert_eq!(LevelValue::Float(2.0).to_string(), "2.0");
        assert_eq!(LevelValue::Float(1e16).to_string(), "1e+16");
        assert_eq!(LevelValue::Float(1e-5).to_string(), "1e-05");
        assert_eq!(LevelValue::Float(1.5e300).to_string(), "1.5e+300");
        assert_eq!(LevelValue::Float(-2.5e-7).to_string(), "-2.5e-07");
        assert_eq!(LevelValue::Float(f64::INFINITY).to_string(), "inf");
        assert_eq!(LevelValue::from("High").to_string(), "High");
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LevelValue::parse("4"), LevelValue::Integer(4));
        assert_eq!(LevelValue::parse(" 0.25 "), LevelValue::Float(0.25));
        assert_eq!(LevelValue::parse("fast"), LevelValue::Text("fast".into()));
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut levels = VariableLevels::new();
        levels.insert("CapA", [2i64, 4]).unwrap();
        let err = levels.insert("CapA", [6i64]).unwrap_err();
        assert!(matches!(err, DesignError::DuplicateVariable(ref n) if n == "CapA"));
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn test_insert_rejects_blank_name() {
        let mut levels = VariableLevels::new();
        assert!(matches!(
            levels.insert("  ", [1i64]),
            Err(DesignError::EmptyVariableName)
        ));
    }

    #[test]
    fn test_combination_count() {
        let levels = VariableLevels::new()
            .with("x", [2i64, 4, 6])
            .unwrap()
            .with("y", [1i64, 2, 3, 4, 5])
            .unwrap()
            .with("z", [1i64, 2, 3])
            .unwrap();
        assert_eq!(levels.combination_count(), Some(45));
        assert_eq!(VariableLevels::new().combination_count(), Some(1));
    }

    #[test]
    fn test_combination_count_overflow() {
        let mut levels = VariableLevels::new();
        for i in 0..70 {
            levels.insert(format!("v{i}"), [1i64, 2]).unwrap();
        }
        assert_eq!(levels.combination_count(), None);

        // an empty variable anywhere still means no combinations
        levels.insert("empty", Vec::<LevelValue>::new()).unwrap();
        assert_eq!(levels.combination_count(), Some(0));
    }

    #[test]
    fn test_parse_var_spec() {
        let (name, values) = VariableLevels::parse_var_spec("CapA=2,4").unwrap();
        assert_eq!(name, "CapA");
        assert_eq!(values, vec![LevelValue::Integer(2), LevelValue::Integer(4)]);

        let (_, values) = VariableLevels::parse_var_spec("Rule=FIFO, LIFO").unwrap();
        assert_eq!(
            values,
            vec![LevelValue::Text("FIFO".into()), LevelValue::Text("LIFO".into())]
        );

        let (_, values) = VariableLevels::parse_var_spec("Empty=").unwrap();
        assert!(values.is_empty());

        assert!(VariableLevels::parse_var_spec("NoEquals").is_err());
        assert!(VariableLevels::parse_var_spec("=1,2").is_err());
    }

    #[test]
    fn test_from_var_specs_keeps_order() {
        let levels = VariableLevels::from_var_specs(&["Zeta=1", "Alpha=2,3"]).unwrap();
        let names: Vec<_> = levels.variables().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_json_preserves_key_order() {
        let json = r#"{"Zeta": [1], "Buff1": [3], "CapA": [2, 4.5, "x"]}"#;
        let levels: VariableLevels = serde_json::from_str(json).unwrap();
        let names: Vec<_> = levels.variables().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Buff1", "CapA"]);
        assert_eq!(
            levels.variables()[2].levels,
            vec![
                LevelValue::Integer(2),
                LevelValue::Float(4.5),
                LevelValue::Text("x".into())
            ]
        );
    }

    #[test]
    fn test_json_rejects_duplicate_keys() {
        let json = r#"{"CapA": [1], "CapA": [2]}"#;
        let result: Result<VariableLevels, _> = serde_json::from_str(json);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("CapA"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_from_json_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"{{"Buff1": [3], "CapA": [2, 4]}}"#).unwrap();
        temp_file.flush().unwrap();

        let levels = VariableLevels::from_json_file(temp_file.path())
            .await
            .unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels.combination_count(), Some(2));
    }

    #[tokio::test]
    async fn test_from_json_file_missing() {
        let result = VariableLevels::from_json_file("/definitely/not/here.json").await;
        assert!(result.is_err());
    }
}
