//! Field type resolution.
//!
//! Maps one [`FieldDescriptor`] to exactly one [`ResolvedField`],
//! deterministically and without I/O.
//!
//! # Resolution Order
//!
//! First match wins:
//!
//! 1. Explicit remote type on the descriptor.
//! 2. Enumeration → single select, choices from the members in order.
//! 3. List of text → multi select.
//! 4. Name patterns (see [`NAME_RULES`]), for text and numeric fields only.
//! 5. Plain declared-type mapping.
//! 6. Single line text.
//!
//! # Name Patterns
//!
//! | Order | Substrings | Type | Declared types |
//! |-------|------------|------|----------------|
//! | 1 | email, e_mail, mail, contact | email | text |
//! | 2 | url, link, website, site, href | url | text |
//! | 3 | phone, tel, mobile, cell | phoneNumber | text |
//! | 4 | description, comment, note, bio, summary, content, body, message, detail | multilineText | text |
//! | 5 | price, cost, amount, fee, salary, wage, revenue, budget, payment | currency | integer, float |
//! | 6 | percent, percentage, rate, ratio | percent | integer, float |

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::field::{
    Choice, DeclaredType, FieldDescriptor, FieldOptions, FieldType, NamedFormat, ResolvedField,
};

/// Which declared types a name rule may apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    Text,
    Numeric,
}

/// One row of the ordered name-pattern table.
#[derive(Debug)]
pub struct NameRule {
    pub scope: RuleScope,
    pub patterns: &'static [&'static str],
    pub field_type: FieldType,
}

/// Name-pattern rules in precedence order.
pub static NAME_RULES: [NameRule; 6] = [
    NameRule {
        scope: RuleScope::Text,
        patterns: &["email", "e_mail", "mail", "contact"],
        field_type: FieldType::Email,
    },
    NameRule {
        scope: RuleScope::Text,
        patterns: &["url", "link", "website", "site", "href"],
        field_type: FieldType::Url,
    },
    NameRule {
        scope: RuleScope::Text,
        patterns: &["phone", "tel", "mobile", "cell"],
        field_type: FieldType::Phone,
    },
    NameRule {
        scope: RuleScope::Text,
        patterns: &[
            "description",
            "comment",
            "note",
            "bio",
            "summary",
            "content",
            "body",
            "message",
            "detail",
        ],
        field_type: FieldType::LongText,
    },
    NameRule {
        scope: RuleScope::Numeric,
        patterns: &[
            "price", "cost", "amount", "fee", "salary", "wage", "revenue", "budget", "payment",
        ],
        field_type: FieldType::Currency,
    },
    NameRule {
        scope: RuleScope::Numeric,
        patterns: &["percent", "percentage", "rate", "ratio"],
        field_type: FieldType::Percent,
    },
];

const DEFAULT_CURRENCY_SYMBOL: &str = "$";
const DEFAULT_CURRENCY_PRECISION: u8 = 2;
const DEFAULT_PERCENT_PRECISION: u8 = 1;
const DEFAULT_FLOAT_PRECISION: u8 = 2;

/// Resolve a descriptor into its remote column.
///
/// # Errors
///
/// - [`Error::MissingChoices`] if the field resolves to a selection type
///   that requires choices and has none.
/// - [`Error::DuplicateChoice`] if a choice repeats (case-sensitive).
/// - [`Error::UnexpectedChoices`] if choices were given but the field does
///   not resolve to a selection type.
pub fn resolve(field: &FieldDescriptor) -> Result<ResolvedField> {
    let remote_type = resolve_type(field);
    let options = build_options(field, &remote_type)?;

    Ok(ResolvedField {
        remote_name: field.column_name().to_string(),
        remote_type,
        description: field.description.clone(),
        options,
    })
}

/// The remote type alone, without option or choice validation.
pub fn resolve_type(field: &FieldDescriptor) -> FieldType {
    if let Some(explicit) = &field.remote_type {
        return explicit.clone();
    }

    match &field.declared_type {
        DeclaredType::Enumeration(_) => return FieldType::Select,
        DeclaredType::ListOfText => return FieldType::MultiSelect,
        _ => {}
    }

    if let Some(detected) = detect_from_name(&field.name, &field.declared_type) {
        return detected;
    }

    match field.declared_type {
        DeclaredType::Text => FieldType::SingleLineText,
        DeclaredType::Integer | DeclaredType::Float => FieldType::Number,
        DeclaredType::Boolean => FieldType::Checkbox,
        DeclaredType::DateTime => FieldType::DateTime,
        DeclaredType::Date => FieldType::Date,
        _ => FieldType::SingleLineText,
    }
}

/// Run the name-pattern table against a field name.
///
/// Returns `None` for declared types outside every rule's scope (booleans,
/// dates, selections), so e.g. a boolean `contact_email` is never an email.
pub fn detect_from_name(name: &str, declared: &DeclaredType) -> Option<FieldType> {
    let scope = match declared {
        DeclaredType::Text => RuleScope::Text,
        DeclaredType::Integer | DeclaredType::Float => RuleScope::Numeric,
        _ => return None,
    };
    let folded = name.to_lowercase();

    NAME_RULES
        .iter()
        .filter(|rule| rule.scope == scope)
        .find(|rule| rule.patterns.iter().any(|p| folded.contains(p)))
        .map(|rule| rule.field_type.clone())
}

fn build_options(field: &FieldDescriptor, remote_type: &FieldType) -> Result<FieldOptions> {
    let mut options = FieldOptions::default();

    match remote_type {
        FieldType::Currency => {
            options.precision = Some(field.precision.unwrap_or(DEFAULT_CURRENCY_PRECISION));
            options.symbol = Some(
                field
                    .symbol
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CURRENCY_SYMBOL.to_string()),
            );
        }
        FieldType::Percent => {
            options.precision = Some(field.precision.unwrap_or(DEFAULT_PERCENT_PRECISION));
        }
        FieldType::Number => {
            let default = if field.declared_type == DeclaredType::Integer {
                0
            } else {
                DEFAULT_FLOAT_PRECISION
            };
            options.precision = Some(field.precision.unwrap_or(default));
        }
        FieldType::Checkbox => {
            options.icon = Some("check".to_string());
            options.color = Some("greenBright".to_string());
        }
        FieldType::Date => {
            options.date_format = Some(NamedFormat::new("iso"));
        }
        FieldType::DateTime => {
            options.date_format = Some(NamedFormat::new("iso"));
            options.time_format = Some(NamedFormat::new("24hour"));
            options.time_zone = Some("utc".to_string());
        }
        FieldType::Select | FieldType::MultiSelect => {
            options.choices = resolve_choices(field)?;
        }
        _ => {}
    }

    if !remote_type.is_selection() && field.choices.is_some() {
        return Err(Error::UnexpectedChoices {
            field: field.name.clone(),
            remote_type: remote_type.to_string(),
        });
    }

    Ok(options)
}

/// Choices for a selection-typed field.
///
/// Explicit descriptor choices win over enumeration members. A list-of-text
/// field without choices is allowed (the remote side grows the set on write);
/// an explicit selection type or an enumeration must have at least one.
fn resolve_choices(field: &FieldDescriptor) -> Result<Option<Vec<Choice>>> {
    let members = match &field.declared_type {
        DeclaredType::Enumeration(members) => Some(members),
        _ => None,
    };
    let source = field.choices.as_ref().or(members);

    let must_have_choices = field.remote_type.is_some() || members.is_some();
    let choices = match source {
        Some(c) if !c.is_empty() => c,
        _ if must_have_choices => {
            return Err(Error::MissingChoices {
                field: field.name.clone(),
            })
        }
        _ => return Ok(None),
    };

    let mut seen = HashSet::new();
    for choice in choices {
        if !seen.insert(choice.as_str()) {
            return Err(Error::DuplicateChoice {
                field: field.name.clone(),
                choice: choice.clone(),
            });
        }
    }

    Ok(Some(
        choices
            .iter()
            .map(|name| Choice { name: name.clone() })
            .collect(),
    ))
}
