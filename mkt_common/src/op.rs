//! Operator boilerplate for `i64`-backed newtypes.

/// Implements a standard arithmetic trait for a tuple struct wrapping an `i64`.
///
/// `op!(binary Points, Add, add)` expands to `impl Add for Points`, and so on for
/// `inplace` (e.g. `SubAssign`) and `unary` (e.g. `Neg`) variants. The relevant
/// `std::ops` trait must be in scope at the call site.
#[macro_export]
macro_rules! op {
    (binary $t:ty, $op:ident, $method:ident) => {
        impl $op for $t {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self($op::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $t:ty, $op:ident, $method:ident) => {
        impl $op for $t {
            fn $method(&mut self, rhs: Self) {
                $op::$method(&mut self.0, rhs.0)
            }
        }
    };
    (unary $t:ty, $op:ident, $method:ident) => {
        impl $op for $t {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self($op::$method(self.0))
            }
        }
    };
}
