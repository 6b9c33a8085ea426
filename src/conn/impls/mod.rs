mod borrowed;
#[cfg(feature = "std")]
mod tcpstream;
