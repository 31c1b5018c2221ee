/// Declare a framed type.
///
/// Every listed property is stored in a generated record type and reached
/// through the frame runtime; callers only see a getter and a setter.
///
/// ```
/// use frames_core::framed;
///
/// framed! {
///     pub struct Counter: CounterRecord {
///         count / set_count: i64 = 0,
///         label / set_label: String = String::from("clicks"),
///     }
/// }
///
/// let manager = frames_core::runtime::FrameManager::new(Default::default());
/// let counter = Counter::new_in(&manager);
/// manager.with_frame(|_| counter.set_count(5)).unwrap();
/// assert_eq!(counter.count(), 5);
/// ```
#[macro_export]
macro_rules! framed {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $record:ident {
            $( $field:ident / $setter:ident : $ty:ty = $init:expr ),* $(,)?
        }
    ) => {
        #[derive(Debug, Clone, Default)]
        $vis struct $record {
            $( pub $field: $ty, )*
        }

        impl $crate::runtime::Record for $record {
            fn create() -> Self {
                <Self as ::std::default::Default>::default()
            }

            fn assign(&mut self, other: &Self) {
                $( self.$field = ::std::clone::Clone::clone(&other.$field); )*
            }
        }

        $(#[$meta])*
        $vis struct $name {
            frame_record: $crate::runtime::RecordChain<$record>,
        }

        impl $name {
            /// Construct in the ambient frame manager
            pub fn new() -> Self {
                Self::new_in(&$crate::runtime::FrameManager::ambient())
            }

            pub fn new_in(manager: &::std::sync::Arc<$crate::runtime::FrameManager>) -> Self {
                let this = Self {
                    frame_record: $crate::runtime::RecordChain::new_in(
                        manager,
                        stringify!($name),
                        <$record as $crate::runtime::Record>::create(),
                    ),
                };
                {
                    let first = this.frame_record.first_record();
                    let mut _record = first.write();
                    $( _record.$field = $init; )*
                }
                $crate::runtime::notify_created(&this);
                this
            }

            $(
                pub fn $field(&self) -> $ty {
                    let record = $crate::runtime::readable(&self.frame_record, self);
                    let value = ::std::clone::Clone::clone(&record.read().$field);
                    value
                }

                pub fn $setter(&self, value: $ty) {
                    let record = $crate::runtime::writable(&self.frame_record, self);
                    record.write().$field = value;
                }
            )*
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("id", &self.frame_record.id())
                    .field("generations", &self.frame_record.generations())
                    .finish()
            }
        }

        impl $crate::runtime::Framed for $name {
            type Record = $record;

            fn first_frame_record(&self) -> &$crate::runtime::RecordChain<$record> {
                &self.frame_record
            }
        }
    };
}
