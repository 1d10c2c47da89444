#[macro_export]
#[doc(hidden)]
macro_rules! dummy {
    ($t:expr) => {
        ()
    };
}

/// Defines an enum naming one of a family of identical register blocks
/// (filters, masks, Tx and Rx buffers), each variant mapped to the
/// addresses of its block.
#[macro_export]
#[doc(hidden)]
macro_rules! reg_block_def {
    (
        $(#[doc = $doc:expr])*
        $name:ident($n:expr) => {
            $(
                $(#[doc = $blk_doc:expr])*
                $blk:ident => $regs:expr
            ),*
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
        pub enum $name {
            $(
                $(#[doc = $blk_doc])*
                $blk,
            )*
        }

        impl $name {
            #[doc = concat!("All valid options for [`", stringify!($name), "`].")]
            pub const ALL: [Self; <[_]>::len(&[$($crate::dummy!($blk)),*])] = [$(Self::$blk),*];

            #[doc = concat!("Returns the register block of this [`", stringify!($name), "`], lowest address first.")]
            pub const fn registers(self) -> [$crate::regs::Register; $n] {
                match self {
                    $(Self::$blk => $regs,)*
                }
            }

            /// Zero-based index of the block, as numbered in the datasheet.
            #[inline]
            pub const fn index(self) -> u8 {
                self as u8
            }

            #[doc = concat!("Looks up a [`", stringify!($name), "`] by its datasheet index.")]
            pub fn from_index(index: u8) -> Option<Self> {
                Self::ALL.get(index as usize).copied()
            }
        }
    };
}
