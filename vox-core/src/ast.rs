/// Constant / condition expression tree produced by [`crate::parser`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Bool(bool),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    /// True if any name appears anywhere in the tree.
    pub fn mentions_names(&self) -> bool {
        match self {
            Expr::Name(_) => true,
            Expr::Unary { operand, .. } => operand.mentions_names(),
            Expr::Binary { lhs, rhs, .. } => lhs.mentions_names() || rhs.mentions_names(),
            Expr::Int(_) | Expr::Float(_) | Expr::Bool(_) => false,
        }
    }
}
