//! Kubernetes quantity grammar
//!
//! ```text
//! <quantity>        ::= <signedNumber><suffix>
//! <suffix>          ::= <binarySI> | <decimalExponent> | <decimalSI>
//! <binarySI>        ::= Ki | Mi | Gi | Ti | Pi | Ei
//! <decimalSI>       ::= m | "" | k | M | G | T | P | E
//! <decimalExponent> ::= "e" <signedNumber> | "E" <signedNumber>
//! ```
//!
//! The API server canonicalizes quantities itself, so a valid string is passed
//! through unchanged.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CoreError, Result};

static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:Ki|Mi|Gi|Ti|Pi|Ei|[eE][+-]?[0-9]+|m|k|M|G|T|P|E)?$",
    )
    .expect("quantity pattern is valid")
});

/// Validate `value` against the quantity grammar
///
/// `field` names the TrainJob field the value came from and is carried in the error.
pub fn parse_quantity(field: &str, value: &str) -> Result<Quantity> {
    if QUANTITY_RE.is_match(value) {
        Ok(Quantity(value.to_string()))
    } else {
        Err(CoreError::InvalidQuantity {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}
