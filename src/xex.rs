use miette::Result;

use crate::{
    emitter::{Program, Segment},
    error,
};

/// Binary load file signature, written once at the very start.
pub const SIGNATURE: [u8; 2] = [0xFF, 0xFF];
/// RUNAD: where the loader jumps once every segment is in memory.
pub const RUN_VECTOR: u16 = 0x02E0;
/// INITAD: called by the loader right after the segment that writes it.
pub const INIT_VECTOR: u16 = 0x02E2;
pub const DEFAULT_INIT_STUB: u16 = 0x2E00;

const JMP_ABS: u8 = 0x4C;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockKind {
    Data,
    /// `JMP` to an init routine
    Stub,
    /// Write to INITAD, which makes the loader call the stub
    InitVector,
}

/// Addressed chunk of the image, exactly as the loader sees it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Block {
    pub start: u16,
    pub data: Vec<u8>,
    pub kind: BlockKind,
}

impl Block {
    pub fn end(&self) -> u16 {
        (self.start as usize + self.data.len() - 1) as u16
    }
}

/// Wraps a [`Program`] into a binary load image.
#[derive(Clone, Copy, Debug)]
pub struct XexBuilder {
    init_stub: u16,
}

impl Default for XexBuilder {
    fn default() -> Self {
        XexBuilder {
            init_stub: DEFAULT_INIT_STUB,
        }
    }
}

impl XexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scratch address the `JMP` stubs of init segments are loaded to.
    pub fn init_stub(mut self, address: u16) -> Self {
        self.init_stub = address;
        self
    }

    /// Load order of everything in the image. Each init produces a stub and a vector write.
    pub fn blocks(&self, program: &Program) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for segment in &program.segments {
            match segment {
                Segment::Data { data, .. } if data.is_empty() => {}
                Segment::Data { start, data } => {
                    if *start as usize + data.len() > 0x1_0000 {
                        return Err(error::xex_overflow(*start, data.len()));
                    }
                    blocks.push(Block {
                        start: *start,
                        data: data.clone(),
                        kind: BlockKind::Data,
                    });
                }
                Segment::Init { target } => {
                    let [lo, hi] = target.to_le_bytes();
                    blocks.push(Block {
                        start: self.init_stub,
                        data: vec![JMP_ABS, lo, hi],
                        kind: BlockKind::Stub,
                    });
                    blocks.push(Block {
                        start: INIT_VECTOR,
                        data: self.init_stub.to_le_bytes().to_vec(),
                        kind: BlockKind::InitVector,
                    });
                }
            }
        }
        self.check_stub(program)?;
        Ok(blocks)
    }

    /// A stub loaded over program data would corrupt it.
    fn check_stub(&self, program: &Program) -> Result<()> {
        let has_init = program
            .segments
            .iter()
            .any(|segment| matches!(segment, Segment::Init { .. }));
        if !has_init {
            return Ok(());
        }
        let stub = self.init_stub as usize..self.init_stub as usize + 3;
        if stub.end > 0x1_0000 {
            return Err(error::xex_overflow(self.init_stub, stub.len()));
        }
        for segment in &program.segments {
            let Segment::Data { start, data } = segment else {
                continue;
            };
            let range = *start as usize..*start as usize + data.len();
            if range.start < stub.end && stub.start < range.end {
                let end = (range.end - 1) as u16;
                return Err(error::xex_stub_overlap(self.init_stub, *start, end));
            }
        }
        Ok(())
    }

    pub fn build(&self, program: &Program) -> Result<Vec<u8>> {
        let blocks = self.blocks(program)?;
        if blocks.is_empty() && program.run.is_none() {
            return Err(error::xex_empty());
        }

        let mut image = SIGNATURE.to_vec();
        for block in &blocks {
            image.extend_from_slice(&block.start.to_le_bytes());
            image.extend_from_slice(&block.end().to_le_bytes());
            image.extend_from_slice(&block.data);
        }
        if let Some(run) = program.run {
            image.extend_from_slice(&RUN_VECTOR.to_le_bytes());
            image.extend_from_slice(&(RUN_VECTOR + 1).to_le_bytes());
            image.extend_from_slice(&run.to_le_bytes());
        }
        Ok(image)
    }
}
