use crate::domain::PhoneDraft;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("brand must not be empty")]
    EmptyBrand,
    #[error("model must not be empty")]
    EmptyModel,
    #[error("price must not be negative")]
    NegativePrice,
    #[error("price must be a finite number")]
    NonFinitePrice,
    #[error("price is not a number: {0:?}")]
    UnparsablePrice(String),
}

pub fn validate_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() {
        return Err(ValidationError::NonFinitePrice);
    }
    if price < 0.0 {
        return Err(ValidationError::NegativePrice);
    }
    Ok(())
}

/// Brand and model must contain something other than whitespace.
pub fn validate_draft(draft: &PhoneDraft) -> Result<(), ValidationError> {
    if draft.brand.trim().is_empty() {
        return Err(ValidationError::EmptyBrand);
    }
    if draft.model.trim().is_empty() {
        return Err(ValidationError::EmptyModel);
    }
    validate_price(draft.price)
}

/// Parses user-entered price text.
pub fn parse_price(input: &str) -> Result<f64, ValidationError> {
    let price: f64 = input
        .trim()
        .parse()
        .map_err(|_| ValidationError::UnparsablePrice(input.to_string()))?;
    validate_price(price)?;
    Ok(price)
}
