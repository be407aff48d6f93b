//! `enterl2://pay` payment-request URLs
//!
//! Values are carried as text exactly as written in the URL. Address and
//! amount checks happen later, when the request becomes a payment intent.

use std::fmt;
use std::str::FromStr;

use crate::error::PaymentRequestError;
use crate::types::TransactionIntent;

pub const SCHEME: &str = "enterl2";
pub const HOST: &str = "pay";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub to: String,
    /// Amount in the token's smallest unit
    pub amount: String,
    pub token_address: Option<String>,
    pub description: Option<String>,
}

impl PaymentRequest {
    pub fn new(to: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            amount: amount.into(),
            token_address: None,
            description: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token_address = Some(token.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Payment intent paying this request from `from`
    pub fn to_intent(&self, from: impl Into<String>) -> TransactionIntent {
        let mut intent = TransactionIntent::payment(from, self.to.clone(), self.amount.clone());
        intent.token = self.token_address.clone();
        intent.description = self.description.clone();
        intent
    }

    pub fn to_url(&self) -> String {
        create_payment_request(
            &self.to,
            &self.amount,
            self.token_address.as_deref(),
            self.description.as_deref(),
        )
    }
}

impl fmt::Display for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

impl FromStr for PaymentRequest {
    type Err = PaymentRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_payment_request(s)
    }
}

pub fn create_payment_request(
    to: &str,
    amount: &str,
    token: Option<&str>,
    description: Option<&str>,
) -> String {
    let mut url = format!(
        "{}://{}?to={}&amount={}",
        SCHEME,
        HOST,
        urlencoding::encode(to),
        urlencoding::encode(amount)
    );
    if let Some(token) = token {
        url.push_str(&format!("&token={}", urlencoding::encode(token)));
    }
    if let Some(description) = description {
        url.push_str(&format!("&description={}", urlencoding::encode(description)));
    }
    url
}

/// Parse a request URL. Scheme, host and (empty) path must match exactly;
/// `to` and `amount` are required. Unknown parameters are ignored.
pub fn parse_payment_request(raw: &str) -> Result<PaymentRequest, PaymentRequestError> {
    let url = url::Url::parse(raw.trim())
        .map_err(|e| PaymentRequestError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if url.scheme() != SCHEME || url.host_str() != Some(HOST) || !url.path().is_empty() {
        return Err(PaymentRequestError::WrongScheme(raw.to_string()));
    }
    if url.port().is_some() || !url.username().is_empty() || url.fragment().is_some() {
        return Err(PaymentRequestError::WrongScheme(raw.to_string()));
    }

    let mut to = None;
    let mut amount = None;
    let mut token_address = None;
    let mut description = None;

    for (key, value) in url.query_pairs() {
        let slot = match key.as_ref() {
            "to" => &mut to,
            "amount" => &mut amount,
            "token" => &mut token_address,
            "description" => &mut description,
            _ => continue,
        };
        // first occurrence wins
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

    Ok(PaymentRequest {
        to: non_empty(to).ok_or(PaymentRequestError::MissingParameter("to"))?,
        amount: non_empty(amount).ok_or(PaymentRequestError::MissingParameter("amount"))?,
        token_address,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example_request() {
        let request = parse_payment_request(
            "enterl2://pay?to=0xabc&amount=2000000&token=0xusdc&description=lunch",
        )
        .unwrap();
        assert_eq!(
            request,
            PaymentRequest {
                to: "0xabc".into(),
                amount: "2000000".into(),
                token_address: Some("0xusdc".into()),
                description: Some("lunch".into()),
            }
        );
    }

    #[test]
    fn test_round_trip_with_encoded_text() {
        let original = PaymentRequest::new("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266", "1500000")
            .with_token("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913")
            .with_description("Table 4 & tip: 10% + \"thanks\"");

        let url = original.to_url();
        assert!(url.contains("description=Table%204%20%26%20tip"));
        assert_eq!(url.parse::<PaymentRequest>().unwrap(), original);
    }

    #[test]
    fn test_round_trip_without_optionals() {
        let original = PaymentRequest::new("0xabc", "1");
        assert_eq!(original.to_url(), "enterl2://pay?to=0xabc&amount=1");
        assert_eq!(parse_payment_request(&original.to_url()).unwrap(), original);
    }

    #[test]
    fn test_missing_parameters() {
        assert_eq!(
            parse_payment_request("enterl2://pay?amount=1"),
            Err(PaymentRequestError::MissingParameter("to"))
        );
        assert_eq!(
            parse_payment_request("enterl2://pay?to=0xabc"),
            Err(PaymentRequestError::MissingParameter("amount"))
        );
        assert_eq!(
            parse_payment_request("enterl2://pay?to=&amount=1"),
            Err(PaymentRequestError::MissingParameter("to"))
        );
    }

    #[test]
    fn test_rejects_wrong_scheme_or_path() {
        for bad in [
            "https://pay?to=0xabc&amount=1",
            "enterl2://send?to=0xabc&amount=1",
            "enterl2://pay/extra?to=0xabc&amount=1",
            "enterl2://pay:8080?to=0xabc&amount=1",
        ] {
            assert!(
                matches!(parse_payment_request(bad), Err(PaymentRequestError::WrongScheme(_))),
                "{} should be rejected",
                bad
            );
        }
        assert!(matches!(
            parse_payment_request("not a url"),
            Err(PaymentRequestError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_to_intent() {
        let intent = PaymentRequest::new("0xabc", "2000000")
            .with_description("lunch")
            .to_intent("0xdef");
        assert_eq!(intent.from, "0xdef");
        assert_eq!(intent.to, "0xabc");
        assert_eq!(intent.amount, "2000000");
        assert_eq!(intent.description.as_deref(), Some("lunch"));
    }
}
