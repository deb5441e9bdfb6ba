/// Asserts that two float containers are equal within ulps (or `epsilon`) and prints a colored diff when they are not
#[macro_export]
macro_rules! pretty_assert_ulps_eq {
  ($left:expr, $right:expr $(, $opt:ident = $val:expr)* $(,)?) => {{
    let left = &$left;
    let right = &$right;
    if !approx::ulps_eq!(left, right $(, $opt = $val)*) {
      pretty_assertions::assert_eq!(format!("{:#?}", left), format!("{:#?}", right));
      std::panic!("Values are not equal within tolerance");
    }
  }};
}
