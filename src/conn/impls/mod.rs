mod slice;

#[cfg(feature = "alloc")]
mod boxed;

#[cfg(feature = "std")]
mod bufreader;

#[cfg(feature = "std")]
mod tcpstream;
