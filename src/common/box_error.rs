//! error type shared by everything that can fail for real (mostly socket setup).
//!
//! Boxed so errors from std::io, socket2, json and simple_error can all be
//! bubbled up with `?` and still cross a thread boundary if a caller
//! decides to run the controller off the main thread.
pub type BoxError = std::boxed::Box<
    dyn std::error::Error // must implement Error to satisfy ?
        + std::marker::Send // needed for threads
        + std::marker::Sync, // needed for threads
>;
