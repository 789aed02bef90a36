//! Entity repositories.
//!
//! Each module is a set of free functions over any [`StoreExecutor`]: the
//! [`Store`](crate::Store) itself for single statements, or an open
//! transaction when a service needs several statements to land together.
//! Business rules live in the services, not here.
//!
//! [`StoreExecutor`]: crate::executor::StoreExecutor

pub mod adc;
pub mod adc_movement;
pub mod material;
pub mod movement;
pub mod order;

/// `LIKE` pattern matching `needle` anywhere, with `%`, `_` and `\` taken literally.
///
/// Pair it with `ESCAPE '\'` in the statement.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
