//! Type-checked syntax tree
//!
//! This is what the earlier phases (parsing, name resolution, type checking) hand over to code
//! generation. Every expression carries its resolved static type and every reference to a field,
//! method, or local carries its resolved declaration, so [`crate::translate`] never has to look
//! anything up by name.
//!
//! Widening an `int` to `float` may be left implicit: an `int` typed expression can appear wherever
//! a `float` is expected (operands, assigned values, arguments, returned values).

use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldRef, FieldType, MethodAccessFlags,
    MethodDescriptor, MethodRef, RefType, UnqualifiedName,
};

/// Class declaration
#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: BinaryName,
    pub super_class: BinaryName,
    pub interfaces: Vec<BinaryName>,
    pub access_flags: ClassAccessFlags,

    /// Name of the file the class was declared in (eg. `Point.java`)
    pub source_file: Option<String>,

    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
}

impl ClassDecl {
    /// Type of `this` inside the class
    pub fn this_type(&self) -> RefType {
        RefType::Object(self.name.clone())
    }
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: UnqualifiedName,
    pub field_type: FieldType,
    pub access_flags: FieldAccessFlags,
}

/// Method or constructor declaration
#[derive(Clone, Debug)]
pub struct MethodDecl {
    /// `<init>` for constructors
    pub name: UnqualifiedName,
    pub access_flags: MethodAccessFlags,
    pub parameters: Vec<Parameter>,

    /// `None` for `void` methods and constructors
    pub return_type: Option<FieldType>,
    pub body: Block,
}

impl MethodDecl {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }

    /// Erased signature
    pub fn descriptor(&self) -> MethodDescriptor {
        MethodDescriptor {
            parameters: self
                .parameters
                .iter()
                .map(|param| param.param_type.clone())
                .collect(),
            return_type: self.return_type.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Parameter {
    pub local: LocalId,
    pub param_type: FieldType,
}

/// Resolved declaration of a parameter or local variable
///
/// Name resolution gives every declaration in a method a distinct id, so shadowed or reused
/// names never collide.
#[derive(Copy, Clone, Hash, PartialEq, Eq, Debug)]
pub struct LocalId(pub usize);

/// Sequence of statements with its own lexical scope
#[derive(Clone, Debug, Default)]
pub struct Block(pub Vec<Stmt>);

#[derive(Clone, Debug)]
pub enum Stmt {
    /// Expression evaluated for its side effects
    Expr(Expr),

    LocalDecl {
        local: LocalId,
        local_type: FieldType,
        initializer: Option<Expr>,
    },

    Block(Block),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    While {
        label: Option<String>,
        condition: Expr,
        body: Box<Stmt>,
    },

    DoWhile {
        label: Option<String>,
        body: Box<Stmt>,
        condition: Expr,
    },

    /// `for (init; condition; update) body` (a missing condition loops forever)
    For {
        label: Option<String>,
        init: Vec<Stmt>,
        condition: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },

    /// `break` out of the innermost (or named) enclosing loop
    Break(Option<String>),

    /// `continue` the innermost (or named) enclosing loop
    Continue(Option<String>),

    Return(Option<Expr>),

    /// `this(..)` or `super(..)` at the start of a constructor body
    ConstructorCall {
        constructor: MethodRef,
        arguments: Vec<Expr>,
    },
}

/// Expression along with its static type
#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,

    /// `None` only for calls to `void` methods
    pub expr_type: Option<FieldType>,
}

impl Expr {
    pub fn new(kind: ExprKind, expr_type: FieldType) -> Expr {
        Expr {
            kind,
            expr_type: Some(expr_type),
        }
    }

    /// Expression without a value (a call to a `void` method)
    pub fn void(kind: ExprKind) -> Expr {
        Expr {
            kind,
            expr_type: None,
        }
    }

    pub fn int(value: i32) -> Expr {
        Expr::new(ExprKind::Int(value), FieldType::int())
    }

    pub fn float(value: f32) -> Expr {
        Expr::new(ExprKind::Float(value), FieldType::float())
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::new(ExprKind::Boolean(value), FieldType::boolean())
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::new(ExprKind::String(value.into()), FieldType::string())
    }

    pub fn local(local: LocalId, local_type: FieldType) -> Expr {
        Expr::new(ExprKind::Local(local), local_type)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr, expr_type: FieldType) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            expr_type,
        )
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
        Expr::new(
            ExprKind::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            FieldType::boolean(),
        )
    }

    pub fn assign(target: Expr, value: Expr) -> Expr {
        let expr_type = target.expr_type.clone();
        Expr {
            kind: ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            expr_type,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Int(i32),
    Float(f32),
    Boolean(bool),
    String(String),
    Null,

    This,
    Local(LocalId),
    StaticField(FieldRef),
    Field {
        object: Box<Expr>,
        field: FieldRef,
    },
    ArrayElement {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayLength(Box<Expr>),

    /// `target = value` (the target is a local, field, or array element)
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },

    /// `target op= value`
    CompoundAssign {
        op: BinaryOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },

    /// `++target`, `target++`, `--target`, or `target--`
    Increment {
        target: Box<Expr>,
        decrement: bool,
        prefix: bool,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// Arithmetic, bitwise, or (for `String` typed `+`) string concatenation
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Relational or equality comparison
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Short-circuiting `&&` and `||`
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `condition ? then_value : else_value`
    Conditional {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },

    /// Method call
    ///
    /// A missing receiver means `this` for instance methods. `via_super` is for `super.foo()`.
    Call {
        receiver: Option<Box<Expr>>,
        method: MethodRef,
        arguments: Vec<Expr>,
        via_super: bool,
    },

    /// `new C(..)`
    New {
        constructor: MethodRef,
        arguments: Vec<Expr>,
    },

    /// `new T[d1][d2]..[]..` (the expression type is the full array type)
    NewArray { dimensions: Vec<Expr> },

    /// `{ e1, e2, .. }` array initializer (the expression type is the array type)
    ArrayInit(Vec<Expr>),

    /// Explicit conversion to the expression type (`int`/`float` or a reference cast)
    Cast(Box<Expr>),

    InstanceOf {
        operand: Box<Expr>,
        class: RefType,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}


#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum UnaryOp {
    /// Arithmetic negation
    Negate,

    /// Bitwise complement `~`
    BitNot,

    /// Logical `!`
    Not,
}
