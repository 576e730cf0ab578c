//! Expense taxonomy
//!
//! The closed set of category/subcategory pairs a transaction can land in.
//! Model output is free text, so everything it says is resolved against this
//! table before it reaches a caller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Catch-all label used for both category and subcategory
pub const OTHER: &str = "OTHER";

/// Sentinel label used when classification is switched off
pub const UNCLASSIFIED: &str = "UNCLASSIFIED";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "HOME")]
    Home,
    #[serde(rename = "TRANSPORTATION")]
    Transportation,
    #[serde(rename = "DAILY LIVING")]
    DailyLiving,
    #[serde(rename = "ENTERTAINMENT")]
    Entertainment,
    #[serde(rename = "HEALTH")]
    Health,
    #[serde(rename = "VACATION")]
    Vacation,
    #[serde(rename = "OTHER")]
    Other,
    #[serde(rename = "UNCLASSIFIED")]
    Unclassified,
}

impl Category {
    /// Categories offered to the model, in prompt order
    pub const ALL: [Category; 7] = [
        Category::Home,
        Category::Transportation,
        Category::DailyLiving,
        Category::Entertainment,
        Category::Health,
        Category::Vacation,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Home => "HOME",
            Category::Transportation => "TRANSPORTATION",
            Category::DailyLiving => "DAILY LIVING",
            Category::Entertainment => "ENTERTAINMENT",
            Category::Health => "HEALTH",
            Category::Vacation => "VACATION",
            Category::Other => OTHER,
            Category::Unclassified => UNCLASSIFIED,
        }
    }

    pub fn subcategories(&self) -> &'static [&'static str] {
        match self {
            Category::Home => &[
                "Mortgage",
                "Rent",
                "Property Tax",
                "Home Insurance",
                "Utilities",
                "Maintenance",
                "Furniture/Appliances",
                "Home Improvement",
            ],
            Category::Transportation => &[
                "Car Payment",
                "Car Insurance",
                "Gas",
                "Public Transit",
                "Parking",
                "Tolls",
                "Maintenance",
                "Ride Share",
                "Taxi",
            ],
            Category::DailyLiving => &[
                "Groceries",
                "Restaurants",
                "Clothing",
                "Personal Care",
                "Haircut",
                "Phone",
                "Internet",
                "Subscription Services",
            ],
            Category::Entertainment => &[
                "Movies",
                "Concerts",
                "Plays",
                "Sports",
                "Recreation",
                "Video Games",
            ],
            Category::Health => &[
                "Health Insurance",
                "Gym",
                "Doctor",
                "Dentist",
                "Medicine",
                "Prescription",
                "Veterinarian",
                "Life Insurance",
            ],
            Category::Vacation => &["Airfare", "Flight", "Accommodations", "Souvenirs"],
            Category::Other | Category::Unclassified => &[],
        }
    }

    /// Resolve free text to a category. Never yields `Unclassified`.
    pub fn resolve(text: &str) -> Option<Category> {
        let needle = normalize(text);
        if needle.is_empty() {
            return None;
        }

        Category::ALL
            .iter()
            .copied()
            .find(|c| normalize(c.as_str()) == needle)
            .or_else(|| {
                only_match(
                    Category::ALL
                        .iter()
                        .copied()
                        .filter(|c| loosely_matches(c.as_str(), text)),
                )
            })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated (category, subcategory) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxonomyEntry {
    pub category: Category,
    pub subcategory: &'static str,
}

impl TaxonomyEntry {
    pub const OTHER: TaxonomyEntry = TaxonomyEntry {
        category: Category::Other,
        subcategory: OTHER,
    };

    pub const UNCLASSIFIED: TaxonomyEntry = TaxonomyEntry {
        category: Category::Unclassified,
        subcategory: UNCLASSIFIED,
    };
}

/// Map model-supplied labels onto the taxonomy.
///
/// A recognised category keeps its matching subcategory or falls back to
/// `OTHER`. An unrecognised category is recovered from the subcategory when
/// that subcategory belongs to exactly one category.
pub fn resolve(category: Option<&str>, subcategory: Option<&str>) -> TaxonomyEntry {
    let category = category.and_then(Category::resolve);

    match category {
        Some(Category::Other) => TaxonomyEntry::OTHER,
        Some(category) => TaxonomyEntry {
            category,
            subcategory: subcategory
                .and_then(|s| resolve_subcategory(category, s))
                .unwrap_or(OTHER),
        },
        None => subcategory
            .and_then(infer_from_subcategory)
            .unwrap_or(TaxonomyEntry::OTHER),
    }
}

fn resolve_subcategory(category: Category, text: &str) -> Option<&'static str> {
    let needle = normalize(text);
    if needle.is_empty() {
        return None;
    }

    let options = category.subcategories();
    options
        .iter()
        .copied()
        .find(|s| normalize(s) == needle)
        .or_else(|| only_match(options.iter().copied().filter(|s| loosely_matches(s, text))))
}

fn infer_from_subcategory(text: &str) -> Option<TaxonomyEntry> {
    // ambiguous subcategories (e.g. Maintenance) do not pick a category
    only_match(Category::ALL.iter().filter_map(|&category| {
        resolve_subcategory(category, text).map(|subcategory| TaxonomyEntry {
            category,
            subcategory,
        })
    }))
}

/// The single candidate, or `None` when there are zero or several
fn only_match<T>(mut candidates: impl Iterator<Item = T>) -> Option<T> {
    let first = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(first),
    }
}

/// Prompt fragment listing every category and its subcategories
pub fn schema_description() -> String {
    let mut out = String::from(
        "Classify this expense into one of the following categories and subcategories:\n",
    );
    for category in Category::ALL {
        let subs = category.subcategories();
        if subs.is_empty() {
            out.push_str(&format!("- {}\n", category));
        } else {
            out.push_str(&format!("- {}: {}\n", category, subs.join(", ")));
        }
    }
    out
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

const MIN_STEM_LEN: usize = 4;

/// Equal, or equal up to a plural suffix
fn same_word(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= MIN_STEM_LEN && matches!(long.strip_prefix(short), Some("s") | Some("es"))
}

/// Word-for-word match tolerating plurals. A slashed label such as
/// "Furniture/Appliances" also matches each of its halves.
fn loosely_matches(label: &str, text: &str) -> bool {
    let needle = words(text);
    if needle.is_empty() {
        return false;
    }

    label.split('/').chain(std::iter::once(label)).any(|alternative| {
        let candidate = words(alternative);
        candidate.len() == needle.len()
            && candidate.iter().zip(&needle).all(|(a, b)| same_word(a, b))
    })
}
