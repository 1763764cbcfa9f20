use super::typed::{Expr, ExprKind};

/// Whether execution can continue past the statement.
pub fn completes_normally(stmt: &Expr) -> bool {
    match &stmt.kind {
        ExprKind::Return(_) | ExprKind::Break | ExprKind::Continue => false,
        ExprKind::If {
            body,
            else_body: Some(else_body),
            ..
        } => block_completes_normally(body) || block_completes_normally(else_body),
        ExprKind::While { cond, body } => !is_const_true(cond) || breaks_out(body),
        _ => true,
    }
}

pub fn block_completes_normally(block: &[Expr]) -> bool {
    block.iter().all(completes_normally)
}

fn is_const_true(cond: &Expr) -> bool {
    matches!(cond.kind, ExprKind::Bool(true))
}

/// `break` targeting the enclosing loop, nested loops capture their own.
fn breaks_out(block: &[Expr]) -> bool {
    block.iter().any(|stmt| match &stmt.kind {
        ExprKind::Break => true,
        ExprKind::If {
            body, else_body, ..
        } => breaks_out(body) || else_body.as_deref().map(breaks_out).unwrap_or(false),
        _ => false,
    })
}
