use colored::Colorize;

use crate::xex::{Block, BlockKind};

/// Print a dimmed line to stderr when `XEXASM_TRACE=1`.
#[macro_export]
macro_rules! trace {
    ( $fmt:literal $($tt:tt)* ) => {{
        if $crate::env::is_trace_enabled() {
            let mut s = format!($fmt $($tt)*);
            s.push('\n');
            $crate::output::Output::Trace.print_str(&s);
        }
    }};
}

#[derive(Clone, Copy, Debug)]
pub enum Output {
    Normal,
    Trace,
}

impl Output {
    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => print!("{}", string),
            Self::Trace => eprint!("{}", string.dimmed()),
        }
    }

    /// Table of everything written to the image, in load order.
    pub fn print_blocks(&self, blocks: &[Block]) {
        self.print_str("\x1b[2m┌─────────────────────────────────┐\x1b[0m\n");
        self.print_str(
            "\x1b[2m│ \x1b[3mstart   end     size   kind\x1b[0m\x1b[2m     │\x1b[0m\n",
        );
        for block in blocks {
            self.print_str("\x1b[2m│\x1b[0m");
            self.print_str(&format!(
                " \x1b[1m${:04X}\x1b[0m  ${:04X}  {:>5}   {:<8}",
                block.start,
                block.end(),
                block.data.len(),
                block_kind(block),
            ));
            self.print_str(" \x1b[2m│\x1b[0m\n");
        }
        self.print_str("\x1b[2m└─────────────────────────────────┘\x1b[0m\n");
    }
}

fn block_kind(block: &Block) -> &'static str {
    match block.kind {
        BlockKind::Data => "data",
        BlockKind::Stub => "stub",
        BlockKind::InitVector => "init",
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn trace_takes_inline_and_positional_arguments() {
        let pass = 3;
        let value = 0x2000u16;
        crate::trace!("pass {pass:>2}: {}", "changing");
        crate::trace!("  {} = ${value:04X}", "MAIN");
    }
}
