use super::{DecisionType, TradingDecision};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{info, warn};

/// Parse an opaque LLM reply into an ordered decision list.
///
/// An empty result means the reply was unparseable. An explicit empty JSON
/// array is distinct: the model said "do nothing", which becomes a single
/// hold decision. Elements that fail to parse are dropped individually; the
/// rest survive in order.
pub fn parse_decisions(response: &str) -> Vec<TradingDecision> {
    if response.trim().is_empty() {
        warn!("LLM reply is empty");
        return Vec::new();
    }

    let Some(json) = extract_json(response) else {
        warn!(
            head = truncate(response, 200),
            "no JSON found in LLM reply"
        );
        return Vec::new();
    };

    match json {
        Value::Array(items) if items.is_empty() => {
            info!("LLM returned an empty array, treating as hold");
            vec![TradingDecision::empty_reply_hold()]
        }
        Value::Array(items) => {
            let total = items.len();
            let decisions = items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| match decision_from_value(item) {
                    Ok(decision) => Some(decision),
                    Err(error) => {
                        warn!(index, %error, "dropping unparseable decision element");
                        None
                    }
                })
                .collect::<Vec<_>>();
            info!(total, parsed = decisions.len(), "parsed LLM decisions");
            decisions
        }
        value => match decision_from_value(&value) {
            Ok(decision) => vec![decision],
            Err(error) => {
                warn!(%error, "unparseable decision object");
                Vec::new()
            }
        },
    }
}

/// Extract the first parseable JSON payload, trying in order: fenced code
/// blocks, the widest `[..]` array slice, the widest `{..}` object slice,
/// and finally the whole trimmed reply.
pub fn extract_json(text: &str) -> Option<Value> {
    for block in fenced_blocks(text) {
        let block = block.trim();
        if block.starts_with('{') || block.starts_with('[') {
            if let Ok(value) = serde_json::from_str(block) {
                return Some(value);
            }
        }
    }

    if let Some(slice) = widest_slice(text, '[', ']') {
        if let Ok(value) = serde_json::from_str(slice) {
            return Some(value);
        }
    }

    if let Some(slice) = widest_slice(text, '{', '}') {
        if let Ok(value) = serde_json::from_str(slice) {
            return Some(value);
        }
    }

    let trimmed = text.trim();
    serde_json::from_str(trimmed).ok()
}

/// Contents of all triple-backtick fences, with an optional `json` language
/// tag skipped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let body_start = match after_fence.find('\n') {
            // Tolerate a language tag on the fence line, eg/ ```json.
            Some(newline)
                if after_fence[..newline]
                    .trim()
                    .chars()
                    .all(|c| c.is_ascii_alphabetic()) =>
            {
                newline + 1
            }
            _ => 0,
        };
        let body = &after_fence[body_start..];

        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => break,
        }
    }

    blocks
}

fn widest_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn decision_from_value(value: &Value) -> Result<TradingDecision, String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("decision element is not an object: {value}"))?;

    let decision_raw = object
        .get("decision")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing `decision` field".to_string())?
        .to_lowercase();
    let decision = match decision_raw.as_str() {
        "buy" => DecisionType::Buy,
        "sell" => DecisionType::Sell,
        "hold" => DecisionType::Hold,
        "wait" => DecisionType::Wait,
        unknown => return Err(format!("unknown decision type: {unknown}")),
    };

    let stock_code = object.get("stock_code").and_then(|value| match value {
        Value::String(code) => Some(code.trim().to_string()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    });
    // Vendors decorate codes with exchange suffixes; strip anything after
    // the first dot.
    let stock_code = stock_code
        .map(|code| match code.split_once('.') {
            Some((prefix, _)) => prefix.to_string(),
            None => code,
        })
        .filter(|code| !code.is_empty());

    let quantity = match object.get("quantity") {
        None | Some(Value::Null) => None,
        Some(value) => Some(coerce_integer(value).ok_or_else(|| {
            format!("quantity is not integer-coercible: {value}")
        })?),
    };

    let price = match object.get("price") {
        None | Some(Value::Null) => None,
        Some(value) => Some(coerce_decimal(value).ok_or_else(|| {
            format!("price is not decimal-coercible: {value}")
        })?),
    };

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(TradingDecision {
        decision,
        stock_code,
        quantity,
        price,
        reason,
    })
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

fn truncate(text: &str, max: usize) -> &str {
    let mut end = max.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
