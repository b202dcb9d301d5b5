//! Field type definitions.
//!
//! Each [`FieldType`] variant corresponds to a Django model field class, and
//! [`FieldDef`] captures the metadata filters need about a single field: its
//! type, nullability, choices, and human-readable names.

use crate::query::custom_lookups::LookupClass;
use crate::value::Value;

/// The type of a model field.
///
/// Relational fields carry the label (`app_label.model_name`) of the target
/// model. Reverse relations (`ManyToOneRel`) are declared explicitly on the
/// model they are reachable from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    /// Auto-incrementing integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit integer primary key.
    BigAutoField,
    /// Variable-length string.
    CharField,
    /// Unlimited-length text.
    TextField,
    /// Email address.
    EmailField,
    /// URL-friendly string.
    SlugField,
    /// 32-bit signed integer.
    IntegerField,
    /// 64-bit signed integer.
    BigIntegerField,
    /// Positive integer.
    PositiveIntegerField,
    /// 64-bit floating-point number.
    FloatField,
    /// Fixed-precision decimal number.
    DecimalField {
        /// Maximum total digits.
        max_digits: u32,
        /// Digits after the decimal point.
        decimal_places: u32,
    },
    /// Boolean (true/false).
    BooleanField,
    /// Date without time.
    DateField,
    /// Date and time.
    DateTimeField,
    /// Time without date.
    TimeField,
    /// UUID field.
    UuidField,
    /// JSON data.
    JsonField,
    /// Many-to-one relationship.
    ForeignKey {
        /// The target model label (e.g. "auth.user").
        to: String,
    },
    /// One-to-one relationship.
    OneToOneField {
        /// The target model label.
        to: String,
    },
    /// Many-to-many relationship.
    ManyToManyField {
        /// The target model label.
        to: String,
    },
    /// Reverse side of a foreign key (one-to-many).
    ManyToOneRel {
        /// The model holding the foreign key.
        to: String,
    },
}

impl FieldType {
    /// Returns `true` for relational fields.
    pub const fn is_relation(&self) -> bool {
        matches!(
            self,
            Self::ForeignKey { .. }
                | Self::OneToOneField { .. }
                | Self::ManyToManyField { .. }
                | Self::ManyToOneRel { .. }
        )
    }

    /// Returns `true` for relations that may yield several related rows.
    pub const fn is_to_many(&self) -> bool {
        matches!(self, Self::ManyToManyField { .. } | Self::ManyToOneRel { .. })
    }

    /// Returns the label of the related model of a relational field.
    pub fn related_model(&self) -> Option<&str> {
        match self {
            Self::ForeignKey { to }
            | Self::OneToOneField { to }
            | Self::ManyToManyField { to }
            | Self::ManyToOneRel { to } => Some(to),
            _ => None,
        }
    }

    /// Returns the class used to find the lookups registered for this type.
    pub const fn lookup_class(&self) -> LookupClass {
        match self {
            Self::CharField | Self::TextField | Self::EmailField | Self::SlugField => {
                LookupClass::Text
            }
            Self::AutoField
            | Self::BigAutoField
            | Self::IntegerField
            | Self::BigIntegerField
            | Self::PositiveIntegerField => LookupClass::Integer,
            Self::FloatField | Self::DecimalField { .. } => LookupClass::Float,
            Self::BooleanField => LookupClass::Boolean,
            Self::DateField => LookupClass::Date,
            Self::DateTimeField => LookupClass::DateTime,
            Self::TimeField => LookupClass::Time,
            Self::UuidField => LookupClass::Uuid,
            Self::JsonField => LookupClass::Json,
            Self::ForeignKey { .. }
            | Self::OneToOneField { .. }
            | Self::ManyToManyField { .. }
            | Self::ManyToOneRel { .. } => LookupClass::Relation,
        }
    }
}

/// Definition of a model field.
///
/// # Examples
///
/// ```
/// use django_rs_filters_db::fields::{FieldDef, FieldType};
///
/// let field = FieldDef::new("created_at", FieldType::DateTimeField).nullable();
/// assert!(field.null);
/// assert_eq!(field.verbose_name, "created at");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// The attribute name of this field.
    pub name: String,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed.
    pub null: bool,
    /// Maximum character length (for CharField and similar).
    pub max_length: Option<usize>,
    /// Human-readable name for the field.
    pub verbose_name: String,
    /// Human-readable help text.
    pub help_text: String,
    /// Allowed values as (value, display_label) pairs.
    pub choices: Option<Vec<(Value, String)>>,
}

impl FieldDef {
    /// Creates a new `FieldDef` with sensible defaults.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            verbose_name: name.replace('_', " "),
            name,
            field_type,
            primary_key: false,
            null: false,
            max_length: None,
            help_text: String::new(),
            choices: None,
        }
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the human-readable name.
    #[must_use]
    pub fn verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
        self.verbose_name = verbose_name.into();
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = help_text.into();
        self
    }

    /// Restricts the field to a set of choices.
    #[must_use]
    pub fn choices(mut self, choices: Vec<(Value, String)>) -> Self {
        self.choices = Some(choices);
        self
    }

    /// Returns `true` for relational fields.
    pub const fn is_relation(&self) -> bool {
        self.field_type.is_relation()
    }
}
