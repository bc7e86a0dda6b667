// Print macros for kernel output

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {};
}

#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {};
}
