use serde::{Deserialize, Serialize};

/// Declares a fieldless enum mirroring a C enum, with lossless conversion
/// to and from the native integer.
macro_rules! native_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $raw:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// The integer the native library uses for this variant.
            pub fn as_raw(self) -> i32 {
                match self {
                    $( $name::$variant => $raw ),+
                }
            }

            /// Map a native integer back to a variant.
            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $( r if r == $raw => Some($name::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

native_enum! {
    /// Kind of a CAPS object.
    pub enum ObjectType {
        Bodies = -2,
        Attributes = -1,
        Problem = 1,
        Value = 2,
        Analysis = 3,
        Bound = 4,
        VertexSet = 5,
        DataSet = 6,
    }
}

native_enum! {
    /// Subtype of a CAPS object. Meaning depends on the object type.
    pub enum SubType {
        None = 0,
        Static = 1,
        Parametric = 2,
        GeometryIn = 3,
        GeometryOut = 4,
        Branch = 5,
        Parameter = 6,
        User = 7,
        AnalysisIn = 8,
        AnalysisOut = 9,
        Connected = 10,
        Unconnected = 11,
    }
}

native_enum! {
    /// Severity of one entry in a native error list.
    pub enum ErrorType {
        Continuation = -1,
        Info = 0,
        Warning = 1,
        Error = 2,
        Status = 3,
    }
}

native_enum! {
    /// Element type stored in a Value object.
    pub enum ValueType {
        Boolean = 0,
        Integer = 1,
        Double = 2,
        String = 3,
        Tuple = 4,
        Pointer = 5,
        DoubleDot = 6,
        Value = 7,
    }
}

native_enum! {
    /// Dimensionality a Value object may take.
    pub enum Dim {
        Scalar = 0,
        Vector = 1,
        Array2D = 2,
    }
}

native_enum! {
    /// Whether a length or shape may change after creation.
    pub enum Fixed {
        Change = 0,
        Fixed = 1,
    }
}

native_enum! {
    /// Null-ness of a Value object, or of a single element in a partial mask.
    pub enum NullState {
        NotAllowed = 0,
        NotNull = 1,
        IsNull = 2,
        IsPartial = 3,
    }
}

native_enum! {
    /// How values move across a linkage or transfer.
    pub enum TransferMethod {
        Copy = 0,
        Integrate = 1,
        Average = 2,
    }
}

native_enum! {
    /// How a DataSet is populated.
    pub enum DataMethod {
        BuiltIn = 0,
        Sensitivity = 1,
        Analysis = 2,
        Interpolate = 3,
        Conserve = 4,
        User = 5,
    }
}

native_enum! {
    /// Fill state of a Bound.
    pub enum BoundState {
        MultipleError = -2,
        Open = -1,
        Empty = 0,
        Single = 1,
        Multiple = 2,
    }
}

native_enum! {
    /// What an Analysis needs before its outputs are current.
    pub enum AnalysisStatus {
        UpToDate = 0,
        DirtyInputs = 1,
        DirtyGeometry = 2,
        DirtyBoth = 3,
        NewGeometry = 4,
        PostRequired = 5,
        ExecPostRequired = 6,
    }
}

impl AnalysisStatus {
    /// Whether `preAnalysis` has to run again.
    pub fn needs_pre(self) -> bool {
        matches!(
            self,
            AnalysisStatus::DirtyInputs
                | AnalysisStatus::DirtyGeometry
                | AnalysisStatus::DirtyBoth
                | AnalysisStatus::NewGeometry
        )
    }
}

impl ValueType {
    /// Types whose payload is a buffer of doubles.
    pub fn is_real(self) -> bool {
        matches!(self, ValueType::Double | ValueType::DoubleDot)
    }

    /// Types that may carry a unit string.
    pub fn accepts_units(self) -> bool {
        matches!(
            self,
            ValueType::Double | ValueType::DoubleDot | ValueType::String
        )
    }
}

impl Dim {
    /// Smallest dimensionality that admits an `nrow` x `ncol` shape.
    pub fn of_shape(nrow: usize, ncol: usize) -> Self {
        if nrow > 1 && ncol > 1 {
            Dim::Array2D
        } else if nrow > 1 || ncol > 1 {
            Dim::Vector
        } else {
            Dim::Scalar
        }
    }

    /// Whether an `nrow` x `ncol` shape fits this dimensionality.
    pub fn admits(self, nrow: usize, ncol: usize) -> bool {
        match self {
            Dim::Scalar => nrow * ncol == 1,
            Dim::Vector => nrow == 1 || ncol == 1,
            Dim::Array2D => true,
        }
    }
}
