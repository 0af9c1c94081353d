/// Rounds `value` up to the machine word alignment.
///
/// # Examples
///
/// ```rust
/// use nextfit::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `value` down to the machine word alignment.
///
/// ```rust
/// use nextfit::align_down;
///
/// let word = std::mem::size_of::<usize>();
/// assert_eq!(align_down!(word * 3 + 1), word * 3);
/// ```
#[macro_export]
macro_rules! align_down {
  ($value:expr) => {
    $value & !(::core::mem::size_of::<usize>() - 1)
  };
}
