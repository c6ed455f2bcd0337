//! Command capture: runs a step's drawing code in a closed instruction language and records the
//! resulting [`DrawCommand`](crate::draw::DrawCommand)s without drawing anything.
//!
//! ```text
//! // comment
//! let cx = width / 2
//! rect(cx - 100, 80, 200, 120, fill: "#a5d8ff", fill_style: "solid")
//! arrow(cx, 200, cx, 320); text("Boil\nwater", cx, 360, size: 28)
//! ```

mod ast;
mod builder;
mod error;
mod eval;
mod lexer;
mod parser;

pub use builder::{DEFAULT_BEND, DEFAULT_TEXT_SIZE, SketchBuilder};
pub use error::{CaptureError, CapturePhase};

use crate::draw::{CommandList, DrawCommand};
use crate::foundation::core::Canvas;
use crate::foundation::math::Fnv1a64;

/// Parse and evaluate `code`, returning its commands in call order.
///
/// `width` and `height` are bound to the canvas size. Jitter seeds derive from the code text, so
/// capturing the same code twice yields equal (but distinct) lists.
#[tracing::instrument(level = "debug", skip(code), fields(bytes = code.len()))]
pub fn capture(code: &str, canvas: Canvas) -> Result<CommandList, CaptureError> {
    let stmts = parser::parse_program(code)
        .map_err(|e| CaptureError::locate(code, e, CapturePhase::Syntax))?;

    let mut seed = Fnv1a64::new_default();
    seed.write_bytes(code.as_bytes());
    let mut builder = SketchBuilder::with_seed(seed.finish());

    eval::Interpreter::new(canvas, &mut builder)
        .run(&stmts)
        .map_err(|e| CaptureError::locate(code, e, CapturePhase::Runtime))?;

    tracing::debug!(commands = builder.len(), "captured step code");
    Ok(builder.finish())
}

/// Like [`capture`], but a failure becomes a single [`DrawCommand::Notice`] instead of an error.
pub fn capture_or_notice(code: &str, canvas: Canvas) -> CommandList {
    match capture(code, canvas) {
        Ok(list) => list,
        Err(err) => {
            tracing::warn!(error = %err, "step code rejected; showing notice");
            CommandList::from(vec![DrawCommand::Notice {
                message: err.to_string(),
            }])
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/script/capture.rs"]
mod tests;
