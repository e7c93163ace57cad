//! Message traits.
//!
//! A message is one unit of intent. Commands mutate state, queries read it.
//! Both travel through the same dispatcher; the split only documents intent.

/// Any value that can be dispatched.
pub trait Message: Send + 'static {
    /// Value produced by the handler on success.
    type Result: Send + 'static;

    /// Name used in logs and configuration errors.
    fn name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Marker for messages that mutate state.
pub trait Command: Message {}

/// Marker for messages that only read state.
pub trait Query: Message {}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(index) => &full[index + 2..],
        None => full,
    }
}
