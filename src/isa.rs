//! The base MOS 6502 instruction set: mnemonics, addressing modes and opcodes.
//! Undocumented opcodes are not part of it.

use std::{fmt, str::FromStr};

use AddressMode::*;
use Mnemonic::*;

macro_rules! mnemonics {
    ( $( $variant:ident => $name:literal ),* $(,)? ) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub enum Mnemonic {
            $( $variant, )*
        }

        impl Mnemonic {
            pub const ALL: &'static [Mnemonic] = &[ $( Mnemonic::$variant, )* ];

            pub fn name(self) -> &'static str {
                match self {
                    $( Mnemonic::$variant => $name, )*
                }
            }
        }

        impl FromStr for Mnemonic {
            type Err = ();

            /// Case-insensitive.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $( $name => Ok(Mnemonic::$variant), )*
                    _ => Err(()),
                }
            }
        }
    };
}

mnemonics! {
    Adc => "ADC", And => "AND", Asl => "ASL", Bcc => "BCC", Bcs => "BCS", Beq => "BEQ",
    Bit => "BIT", Bmi => "BMI", Bne => "BNE", Bpl => "BPL", Brk => "BRK", Bvc => "BVC",
    Bvs => "BVS", Clc => "CLC", Cld => "CLD", Cli => "CLI", Clv => "CLV", Cmp => "CMP",
    Cpx => "CPX", Cpy => "CPY", Dec => "DEC", Dex => "DEX", Dey => "DEY", Eor => "EOR",
    Inc => "INC", Inx => "INX", Iny => "INY", Jmp => "JMP", Jsr => "JSR", Lda => "LDA",
    Ldx => "LDX", Ldy => "LDY", Lsr => "LSR", Nop => "NOP", Ora => "ORA", Pha => "PHA",
    Php => "PHP", Pla => "PLA", Plp => "PLP", Rol => "ROL", Ror => "ROR", Rti => "RTI",
    Rts => "RTS", Sbc => "SBC", Sec => "SEC", Sed => "SED", Sei => "SEI", Sta => "STA",
    Stx => "STX", Sty => "STY", Tax => "TAX", Tay => "TAY", Tsx => "TSX", Txa => "TXA",
    Txs => "TXS", Tya => "TYA",
}

impl Mnemonic {
    /// Conditional branches only take a relative target.
    pub fn is_branch(self) -> bool {
        matches!(self, Bcc | Bcs | Beq | Bmi | Bne | Bpl | Bvc | Bvs)
    }

    /// Shifts and rotates, which accept `A` or nothing for the accumulator form.
    pub fn is_shift(self) -> bool {
        matches!(self, Asl | Lsr | Rol | Ror)
    }

    pub fn opcode(self, mode: AddressMode) -> Option<u8> {
        OPCODES
            .iter()
            .find(|&&(mnemonic, m, _)| mnemonic == self && m == mode)
            .map(|&(_, _, opcode)| opcode)
    }

    pub fn supports(self, mode: AddressMode) -> bool {
        self.opcode(mode).is_some()
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AddressMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    /// `(abs)`, JMP only
    Indirect,
    /// `(zp,X)`
    IndirectX,
    /// `(zp),Y`
    IndirectY,
    Relative,
}

impl AddressMode {
    /// Encoded size in bytes, opcode included.
    pub fn size(self) -> u8 {
        match self {
            Implied | Accumulator => 1,
            Immediate | ZeroPage | ZeroPageX | ZeroPageY | IndirectX | IndirectY | Relative => 2,
            Absolute | AbsoluteX | AbsoluteY | Indirect => 3,
        }
    }
}

impl fmt::Display for AddressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Implied => "implied",
            Accumulator => "accumulator",
            Immediate => "immediate",
            ZeroPage => "zero page",
            ZeroPageX => "zero page,X",
            ZeroPageY => "zero page,Y",
            Absolute => "absolute",
            AbsoluteX => "absolute,X",
            AbsoluteY => "absolute,Y",
            Indirect => "indirect",
            IndirectX => "(indirect,X)",
            IndirectY => "(indirect),Y",
            Relative => "relative",
        };
        f.write_str(name)
    }
}

#[rustfmt::skip]
static OPCODES: &[(Mnemonic, AddressMode, u8)] = &[
    (Adc, Immediate, 0x69), (Adc, ZeroPage, 0x65), (Adc, ZeroPageX, 0x75), (Adc, Absolute, 0x6D),
    (Adc, AbsoluteX, 0x7D), (Adc, AbsoluteY, 0x79), (Adc, IndirectX, 0x61), (Adc, IndirectY, 0x71),
    (And, Immediate, 0x29), (And, ZeroPage, 0x25), (And, ZeroPageX, 0x35), (And, Absolute, 0x2D),
    (And, AbsoluteX, 0x3D), (And, AbsoluteY, 0x39), (And, IndirectX, 0x21), (And, IndirectY, 0x31),
    (Asl, Accumulator, 0x0A), (Asl, ZeroPage, 0x06), (Asl, ZeroPageX, 0x16), (Asl, Absolute, 0x0E),
    (Asl, AbsoluteX, 0x1E),
    (Bcc, Relative, 0x90), (Bcs, Relative, 0xB0), (Beq, Relative, 0xF0), (Bmi, Relative, 0x30),
    (Bne, Relative, 0xD0), (Bpl, Relative, 0x10), (Bvc, Relative, 0x50), (Bvs, Relative, 0x70),
    (Bit, ZeroPage, 0x24), (Bit, Absolute, 0x2C),
    (Brk, Implied, 0x00),
    (Clc, Implied, 0x18), (Cld, Implied, 0xD8), (Cli, Implied, 0x58), (Clv, Implied, 0xB8),
    (Cmp, Immediate, 0xC9), (Cmp, ZeroPage, 0xC5), (Cmp, ZeroPageX, 0xD5), (Cmp, Absolute, 0xCD),
    (Cmp, AbsoluteX, 0xDD), (Cmp, AbsoluteY, 0xD9), (Cmp, IndirectX, 0xC1), (Cmp, IndirectY, 0xD1),
    (Cpx, Immediate, 0xE0), (Cpx, ZeroPage, 0xE4), (Cpx, Absolute, 0xEC),
    (Cpy, Immediate, 0xC0), (Cpy, ZeroPage, 0xC4), (Cpy, Absolute, 0xCC),
    (Dec, ZeroPage, 0xC6), (Dec, ZeroPageX, 0xD6), (Dec, Absolute, 0xCE), (Dec, AbsoluteX, 0xDE),
    (Dex, Implied, 0xCA), (Dey, Implied, 0x88),
    (Eor, Immediate, 0x49), (Eor, ZeroPage, 0x45), (Eor, ZeroPageX, 0x55), (Eor, Absolute, 0x4D),
    (Eor, AbsoluteX, 0x5D), (Eor, AbsoluteY, 0x59), (Eor, IndirectX, 0x41), (Eor, IndirectY, 0x51),
    (Inc, ZeroPage, 0xE6), (Inc, ZeroPageX, 0xF6), (Inc, Absolute, 0xEE), (Inc, AbsoluteX, 0xFE),
    (Inx, Implied, 0xE8), (Iny, Implied, 0xC8),
    (Jmp, Absolute, 0x4C), (Jmp, Indirect, 0x6C),
    (Jsr, Absolute, 0x20),
    (Lda, Immediate, 0xA9), (Lda, ZeroPage, 0xA5), (Lda, ZeroPageX, 0xB5), (Lda, Absolute, 0xAD),
    (Lda, AbsoluteX, 0xBD), (Lda, AbsoluteY, 0xB9), (Lda, IndirectX, 0xA1), (Lda, IndirectY, 0xB1),
    (Ldx, Immediate, 0xA2), (Ldx, ZeroPage, 0xA6), (Ldx, ZeroPageY, 0xB6), (Ldx, Absolute, 0xAE),
    (Ldx, AbsoluteY, 0xBE),
    (Ldy, Immediate, 0xA0), (Ldy, ZeroPage, 0xA4), (Ldy, ZeroPageX, 0xB4), (Ldy, Absolute, 0xAC),
    (Ldy, AbsoluteX, 0xBC),
    (Lsr, Accumulator, 0x4A), (Lsr, ZeroPage, 0x46), (Lsr, ZeroPageX, 0x56), (Lsr, Absolute, 0x4E),
    (Lsr, AbsoluteX, 0x5E),
    (Nop, Implied, 0xEA),
    (Ora, Immediate, 0x09), (Ora, ZeroPage, 0x05), (Ora, ZeroPageX, 0x15), (Ora, Absolute, 0x0D),
    (Ora, AbsoluteX, 0x1D), (Ora, AbsoluteY, 0x19), (Ora, IndirectX, 0x01), (Ora, IndirectY, 0x11),
    (Pha, Implied, 0x48), (Php, Implied, 0x08), (Pla, Implied, 0x68), (Plp, Implied, 0x28),
    (Rol, Accumulator, 0x2A), (Rol, ZeroPage, 0x26), (Rol, ZeroPageX, 0x36), (Rol, Absolute, 0x2E),
    (Rol, AbsoluteX, 0x3E),
    (Ror, Accumulator, 0x6A), (Ror, ZeroPage, 0x66), (Ror, ZeroPageX, 0x76), (Ror, Absolute, 0x6E),
    (Ror, AbsoluteX, 0x7E),
    (Rti, Implied, 0x40), (Rts, Implied, 0x60),
    (Sbc, Immediate, 0xE9), (Sbc, ZeroPage, 0xE5), (Sbc, ZeroPageX, 0xF5), (Sbc, Absolute, 0xED),
    (Sbc, AbsoluteX, 0xFD), (Sbc, AbsoluteY, 0xF9), (Sbc, IndirectX, 0xE1), (Sbc, IndirectY, 0xF1),
    (Sec, Implied, 0x38), (Sed, Implied, 0xF8), (Sei, Implied, 0x78),
    (Sta, ZeroPage, 0x85), (Sta, ZeroPageX, 0x95), (Sta, Absolute, 0x8D), (Sta, AbsoluteX, 0x9D),
    (Sta, AbsoluteY, 0x99), (Sta, IndirectX, 0x81), (Sta, IndirectY, 0x91),
    (Stx, ZeroPage, 0x86), (Stx, ZeroPageY, 0x96), (Stx, Absolute, 0x8E),
    (Sty, ZeroPage, 0x84), (Sty, ZeroPageX, 0x94), (Sty, Absolute, 0x8C),
    (Tax, Implied, 0xAA), (Tay, Implied, 0xA8), (Tsx, Implied, 0xBA), (Txa, Implied, 0x8A),
    (Txs, Implied, 0x9A), (Tya, Implied, 0x98),
];
