//! Task functions executed by workers.
//!
//! All of them are pure and synchronous; the worker runs them on the
//! blocking pool. Missing fields fall back to defaults, fields of the wrong
//! type are errors.

use num_bigint::BigUint;
use serde_json::{json, Number, Value};
use sha2::{Digest, Sha256};

use rondo_core::{TaskData, TaskType};

const DEFAULT_FIBONACCI_TERMS: u64 = 10;
const DEFAULT_COMPUTE_ITERATIONS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("field {field:?} must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Run one task and produce its result body.
pub fn process(task_type: &TaskType, data: &TaskData) -> Result<TaskData, TaskError> {
    let mut body = TaskData::new();
    match task_type {
        TaskType::Hash => {
            body.insert("hash".into(), json!(sha256_hex(text_field(data)?)));
        }
        TaskType::Fibonacci => {
            let n = count_field(data, "n", DEFAULT_FIBONACCI_TERMS)?;
            let sequence = fibonacci(n).iter().map(big_number).collect();
            body.insert("sequence".into(), Value::Array(sequence));
        }
        TaskType::Reverse => {
            body.insert("reversed".into(), json!(reverse(text_field(data)?)));
        }
        TaskType::Compute => {
            let iterations = count_field(data, "iterations", DEFAULT_COMPUTE_ITERATIONS)?;
            body.insert("result".into(), big_number(&sum_of_squares(iterations)));
        }
        TaskType::Other(_) => {
            body.insert("message".into(), json!("Task processed"));
            body.insert("data".into(), Value::Object(data.clone()));
        }
    }
    Ok(body)
}

/// Lowercase hex SHA-256 of the UTF-8 bytes of `text`.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// First `n` Fibonacci numbers, starting 0, 1. Exact for any `n`.
pub fn fibonacci(n: u64) -> Vec<BigUint> {
    let mut seq = Vec::with_capacity(n.min(4096) as usize);
    let (mut a, mut b) = (BigUint::from(0u32), BigUint::from(1u32));
    for _ in 0..n {
        let next = &a + &b;
        seq.push(std::mem::replace(&mut a, std::mem::replace(&mut b, next)));
    }
    seq
}

/// `text` reversed by code point. Combining marks are not kept with their base.
pub fn reverse(text: &str) -> String {
    text.chars().rev().collect()
}

/// Σ i² for i in 0..iterations, exact.
pub fn sum_of_squares(iterations: u64) -> BigUint {
    if iterations == 0 {
        return BigUint::from(0u32);
    }
    // (n-1)·n·(2n-1) / 6
    let n = BigUint::from(iterations);
    let one = BigUint::from(1u32);
    (&n - &one) * &n * (&n * 2u32 - &one) / 6u32
}

/// A big integer as an exact JSON number.
fn big_number(value: &BigUint) -> Value {
    let digits = value.to_string();
    match digits.parse::<Number>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(digits),
    }
}

fn text_field(data: &TaskData) -> Result<&str, TaskError> {
    match data.get("text") {
        None => Ok(""),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(TaskError::InvalidField {
            field: "text",
            expected: "a string",
        }),
    }
}

fn count_field(data: &TaskData, field: &'static str, default: u64) -> Result<u64, TaskError> {
    match data.get(field) {
        None => Ok(default),
        Some(v) => v.as_u64().ok_or(TaskError::InvalidField {
            field,
            expected: "a non-negative integer",
        }),
    }
}
