//! Field schema: which fields a ticket has and where their values come from.

use crate::types::{FieldMap, ValidationError, is_reserved};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Source of a field's value when the caller does not supply one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefaultProvider {
    /// The caller must supply a value.
    #[default]
    Required,
    /// A fixed value.
    Literal { value: String },
    /// The repository user's "Name <email>".
    GitUser,
}

fn default_editable() -> bool {
    true
}

/// One field of the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    /// Human-readable label
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub help: String,

    #[serde(default)]
    pub default: DefaultProvider,

    /// Whether `edit` may change the value after creation
    #[serde(default = "default_editable")]
    pub editable: bool,

    /// Column width in listings; unlisted when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_width: Option<usize>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, default: DefaultProvider) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            help: String::new(),
            default,
            editable: true,
            list_width: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn list_width(mut self, width: usize) -> Self {
        self.list_width = Some(width);
        self
    }

    /// Label used in listings and prompts.
    pub fn label(&self) -> &str {
        if self.title.is_empty() { &self.name } else { &self.title }
    }
}

/// One line: name, label, where the value comes from, then the help text.
impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.label())?;
        match &self.default {
            DefaultProvider::Required => write!(f, ", required")?,
            DefaultProvider::Literal { value } => write!(f, ", default {:?}", value)?,
            DefaultProvider::GitUser => write!(f, ", default git user")?,
        }
        if !self.editable {
            write!(f, ", read-only")?;
        }
        if !self.help.is_empty() {
            write!(f, ": {}", self.help)?;
        }
        Ok(())
    }
}

/// Errors loading a schema file.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to read fields file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse fields file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid field schema: {0}")]
    Invalid(#[from] ValidationError),
}

/// Ordered list of ticket fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub fields: Vec<FieldSpec>,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldSpec::new(
                    "name",
                    DefaultProvider::Literal {
                        value: "My Ticket".to_string(),
                    },
                )
                .title("Ticket Name")
                .help("Short summary shown in listings")
                .list_width(33),
                FieldSpec::new("description", DefaultProvider::Literal { value: String::new() })
                    .title("Description")
                    .help("Free-form details"),
                FieldSpec::new("author", DefaultProvider::GitUser)
                    .title("Author")
                    .help("Taken from git user.name and user.email")
                    .read_only()
                    .list_width(11),
            ],
        }
    }
}

impl FieldSchema {
    /// Build and validate a schema.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, ValidationError> {
        let schema = Self { fields };
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_yaml(text: &str) -> Result<Self, SchemaError> {
        let schema: FieldSchema = serde_yaml::from_str(text)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String, SchemaError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Names must be non-empty, unique and not reserved.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for spec in &self.fields {
            if spec.name.is_empty() {
                return Err(ValidationError::EmptyFieldName);
            }
            if is_reserved(&spec.name) {
                return Err(ValidationError::ReservedField(spec.name.clone()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ValidationError::DuplicateField(spec.name.clone()));
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields shown as listing columns, in schema order. A width of zero
    /// hides the column.
    pub fn list_columns(&self) -> impl Iterator<Item = (&FieldSpec, usize)> {
        self.fields
            .iter()
            .filter_map(|f| f.list_width.filter(|w| *w > 0).map(|w| (f, w)))
    }

    /// Fields for a new ticket: schema fields in schema order, then any
    /// extra supplied fields in the order given. Reserved names are dropped.
    pub fn resolve_new(&self, supplied: &FieldMap, identity: Option<&str>) -> Result<FieldMap, ValidationError> {
        let mut fields = FieldMap::new();
        for spec in &self.fields {
            let value = match (supplied.get(&spec.name), &spec.default) {
                (Some(value), _) => value.to_string(),
                (None, DefaultProvider::Literal { value }) => value.clone(),
                (None, DefaultProvider::GitUser) => identity
                    .map(str::to_string)
                    .ok_or_else(|| ValidationError::MissingField(spec.name.clone()))?,
                (None, DefaultProvider::Required) => {
                    return Err(ValidationError::MissingField(spec.name.clone()));
                }
            };
            fields.set(spec.name.as_str(), value);
        }
        for (name, value) in supplied.iter() {
            if name.is_empty() {
                return Err(ValidationError::EmptyFieldName);
            }
            if !is_reserved(name) && self.field(name).is_none() {
                fields.set(name, value);
            }
        }
        Ok(fields)
    }

    /// Apply `updates` to `current`. Non-editable schema fields are refused;
    /// reserved names are ignored.
    pub fn apply_edit(&self, current: &FieldMap, updates: &FieldMap) -> Result<FieldMap, ValidationError> {
        let mut fields = current.clone();
        for (name, value) in updates.iter() {
            if name.is_empty() {
                return Err(ValidationError::EmptyFieldName);
            }
            if is_reserved(name) {
                continue;
            }
            if let Some(spec) = self.field(name)
                && !spec.editable
            {
                return Err(ValidationError::ReadOnlyField(name.to_string()));
            }
            fields.set(name, value);
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supplied(pairs: &[(&str, &str)]) -> FieldMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_default_schema() {
        let schema = FieldSchema::default();
        assert!(schema.validate().is_ok());
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "description", "author"]);
        assert!(!schema.field("author").unwrap().editable);

        let columns: Vec<_> = schema.list_columns().map(|(f, w)| (f.label(), w)).collect();
        assert_eq!(columns, vec![("Ticket Name", 33), ("Author", 11)]);
    }

    #[test]
    fn test_zero_width_is_not_listed() {
        let schema = FieldSchema::new(vec![
            FieldSpec::new("summary", DefaultProvider::Required).list_width(20),
            FieldSpec::new("hidden", DefaultProvider::Required).list_width(0),
            FieldSpec::new("notes", DefaultProvider::Required),
        ])
        .unwrap();
        let columns: Vec<_> = schema.list_columns().map(|(f, w)| (f.name.as_str(), w)).collect();
        assert_eq!(columns, vec![("summary", 20)]);

        let yaml = "fields:\n  - name: a\n    list_width: 0\n";
        assert_eq!(FieldSchema::from_yaml(yaml).unwrap().list_columns().count(), 0);
    }

    #[test]
    fn test_field_spec_display_includes_help() {
        let schema = FieldSchema::default();
        let lines: Vec<String> = schema.fields.iter().map(|f| f.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                r#"name (Ticket Name), default "My Ticket": Short summary shown in listings"#,
                r#"description (Description), default "": Free-form details"#,
                "author (Author), default git user, read-only: Taken from git user.name and user.email",
            ]
        );
        assert_eq!(
            FieldSpec::new("summary", DefaultProvider::Required).to_string(),
            "summary (summary), required"
        );
    }

    #[test]
    fn test_resolve_new_fills_defaults() {
        let schema = FieldSchema::default();
        let fields = schema
            .resolve_new(&supplied(&[("description", "broken")]), Some("Ann <ann@example.com>"))
            .unwrap();
        assert_eq!(
            fields.iter().collect::<Vec<_>>(),
            vec![
                ("name", "My Ticket"),
                ("description", "broken"),
                ("author", "Ann <ann@example.com>")
            ]
        );
    }

    #[test]
    fn test_resolve_new_keeps_extras_and_drops_reserved() {
        let schema = FieldSchema::default();
        let fields = schema
            .resolve_new(&supplied(&[("zeta", "z"), ("num", "99"), ("name", "n")]), Some("me"))
            .unwrap();
        assert_eq!(fields.get("zeta"), Some("z"));
        assert_eq!(fields.get("name"), Some("n"));
        assert!(!fields.contains("num"));
        assert_eq!(fields.iter().last(), Some(("zeta", "z")));
    }

    #[test]
    fn test_resolve_new_missing_values() {
        let schema = FieldSchema::new(vec![FieldSpec::new("summary", DefaultProvider::Required)]).unwrap();
        assert_eq!(
            schema.resolve_new(&FieldMap::new(), None),
            Err(ValidationError::MissingField("summary".into()))
        );

        let schema = FieldSchema::default();
        assert_eq!(
            schema.resolve_new(&FieldMap::new(), None),
            Err(ValidationError::MissingField("author".into()))
        );
    }

    #[test]
    fn test_apply_edit() {
        let schema = FieldSchema::default();
        let current = supplied(&[("name", "old"), ("description", "d"), ("author", "me")]);

        let edited = schema
            .apply_edit(&current, &supplied(&[("name", "new"), ("uuid", "x")]))
            .unwrap();
        assert_eq!(edited.get("name"), Some("new"));
        assert_eq!(edited.get("description"), Some("d"));
        assert!(!edited.contains("uuid"));

        assert_eq!(
            schema.apply_edit(&current, &supplied(&[("author", "someone")])),
            Err(ValidationError::ReadOnlyField("author".into()))
        );
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        let dup = vec![
            FieldSpec::new("a", DefaultProvider::Required),
            FieldSpec::new("a", DefaultProvider::Required),
        ];
        assert_eq!(FieldSchema::new(dup), Err(ValidationError::DuplicateField("a".into())));
        assert_eq!(
            FieldSchema::new(vec![FieldSpec::new("uuid", DefaultProvider::Required)]),
            Err(ValidationError::ReservedField("uuid".into()))
        );
        assert_eq!(
            FieldSchema::new(vec![FieldSpec::new("", DefaultProvider::Required)]),
            Err(ValidationError::EmptyFieldName)
        );
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
fields:
  - name: summary
    title: Summary
    list_width: 40
  - name: severity
    default:
      kind: literal
      value: low
  - name: reporter
    default:
      kind: git_user
    editable: false
"#;
        let schema = FieldSchema::from_yaml(yaml).unwrap();
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[0].default, DefaultProvider::Required);
        assert_eq!(schema.fields[0].list_width, Some(40));
        assert!(schema.fields[1].editable);
        assert_eq!(
            schema.fields[1].default,
            DefaultProvider::Literal { value: "low".into() }
        );
        assert_eq!(schema.fields[2].default, DefaultProvider::GitUser);
        assert!(!schema.fields[2].editable);
    }

    #[test]
    fn test_from_yaml_validates() {
        let yaml = "fields:\n  - name: num\n";
        assert!(matches!(
            FieldSchema::from_yaml(yaml),
            Err(SchemaError::Invalid(ValidationError::ReservedField(_)))
        ));
        assert!(matches!(FieldSchema::from_yaml("fields: 3"), Err(SchemaError::Yaml(_))));
    }

    #[test]
    fn test_yaml_round_trip_of_default() {
        let schema = FieldSchema::default();
        let yaml = schema.to_yaml().unwrap();
        assert_eq!(FieldSchema::from_yaml(&yaml).unwrap(), schema);
    }
}
