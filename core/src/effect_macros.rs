//! Declarative macros for ergonomic effect construction
//!
//! Session reducers mostly emit "call the API, map the result to an action"
//! effects; these macros keep that boilerplate out of the match arms.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use topout_core::async_effect;
///
/// async_effect! {
///     match api.fetch_startlist(query).await {
///         Ok(entries) => Some(ReorderAction::Loaded { entries }),
///         Err(error) => Some(ReorderAction::LoadFailed { error: error.to_string() }),
///     }
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}
