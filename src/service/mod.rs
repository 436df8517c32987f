//! Services: payload and filter validation, cached listings.

mod listing;
mod validation;

pub use listing::ListingService;
pub use validation::{normalize_rules, RuleMap, RuleValidator, Validator};
