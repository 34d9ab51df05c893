/// Instruction operations of the integer processor.
///
/// Byte variants share the word opcode; the decoder reports the byte flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Opcode {
    Halt,
    Wait,
    Rti,
    Bpt,
    Iot,
    Reset,
    Rtt,
    Jmp,
    Rts,
    Spl,
    ConditionCode,
    Swab,
    Br,
    Bne,
    Beq,
    Bge,
    Blt,
    Bgt,
    Ble,
    Jsr,
    Clr,
    Com,
    Inc,
    Dec,
    Neg,
    Adc,
    Sbc,
    Tst,
    Ror,
    Rol,
    Asr,
    Asl,
    Mark,
    Mfp,
    Mtp,
    Sxt,
    Mov,
    Cmp,
    Bit,
    Bic,
    Bis,
    Add,
    Sub,
    Mul,
    Div,
    Ash,
    Ashc,
    Xor,
    Sob,
    Bpl,
    Bmi,
    Bhi,
    Blos,
    Bvc,
    Bvs,
    Bcc,
    Bcs,
    Emt,
    Trap,
    Fpp,
    /// Reserved or unimplemented: traps through vector 10.
    Reserved,
}

impl Opcode {
    /// Returns `true` for instructions whose bit 15 selects a byte variant.
    #[must_use]
    pub const fn has_byte_form(self) -> bool {
        matches!(
            self,
            Self::Clr
                | Self::Com
                | Self::Inc
                | Self::Dec
                | Self::Neg
                | Self::Adc
                | Self::Sbc
                | Self::Tst
                | Self::Ror
                | Self::Rol
                | Self::Asr
                | Self::Asl
                | Self::Mov
                | Self::Cmp
                | Self::Bit
                | Self::Bic
                | Self::Bis
        )
    }

    /// Returns `true` for the conditional and unconditional branches.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Br
                | Self::Bne
                | Self::Beq
                | Self::Bge
                | Self::Blt
                | Self::Bgt
                | Self::Ble
                | Self::Bpl
                | Self::Bmi
                | Self::Bhi
                | Self::Blos
                | Self::Bvc
                | Self::Bvs
                | Self::Bcc
                | Self::Bcs
        )
    }
}

/// `(mask, pattern, opcode)` entries in decode priority order.
///
/// The first entry with `word & mask == pattern` wins; words matching no
/// entry are [`Opcode::Reserved`].
pub const OPCODE_TABLE: &[(u16, u16, Opcode)] = &[
    (0o177777, 0o000000, Opcode::Halt),
    (0o177777, 0o000001, Opcode::Wait),
    (0o177777, 0o000002, Opcode::Rti),
    (0o177777, 0o000003, Opcode::Bpt),
    (0o177777, 0o000004, Opcode::Iot),
    (0o177777, 0o000005, Opcode::Reset),
    (0o177777, 0o000006, Opcode::Rtt),
    (0o177700, 0o000100, Opcode::Jmp),
    (0o177770, 0o000200, Opcode::Rts),
    (0o177770, 0o000230, Opcode::Spl),
    (0o177740, 0o000240, Opcode::ConditionCode),
    (0o177700, 0o000300, Opcode::Swab),
    (0o177400, 0o000400, Opcode::Br),
    (0o177400, 0o001000, Opcode::Bne),
    (0o177400, 0o001400, Opcode::Beq),
    (0o177400, 0o002000, Opcode::Bge),
    (0o177400, 0o002400, Opcode::Blt),
    (0o177400, 0o003000, Opcode::Bgt),
    (0o177400, 0o003400, Opcode::Ble),
    (0o177000, 0o004000, Opcode::Jsr),
    (0o077700, 0o005000, Opcode::Clr),
    (0o077700, 0o005100, Opcode::Com),
    (0o077700, 0o005200, Opcode::Inc),
    (0o077700, 0o005300, Opcode::Dec),
    (0o077700, 0o005400, Opcode::Neg),
    (0o077700, 0o005500, Opcode::Adc),
    (0o077700, 0o005600, Opcode::Sbc),
    (0o077700, 0o005700, Opcode::Tst),
    (0o077700, 0o006000, Opcode::Ror),
    (0o077700, 0o006100, Opcode::Rol),
    (0o077700, 0o006200, Opcode::Asr),
    (0o077700, 0o006300, Opcode::Asl),
    (0o177700, 0o006400, Opcode::Mark),
    (0o077700, 0o006500, Opcode::Mfp),
    (0o077700, 0o006600, Opcode::Mtp),
    (0o177700, 0o006700, Opcode::Sxt),
    (0o070000, 0o010000, Opcode::Mov),
    (0o070000, 0o020000, Opcode::Cmp),
    (0o070000, 0o030000, Opcode::Bit),
    (0o070000, 0o040000, Opcode::Bic),
    (0o070000, 0o050000, Opcode::Bis),
    (0o170000, 0o060000, Opcode::Add),
    (0o170000, 0o160000, Opcode::Sub),
    (0o177000, 0o070000, Opcode::Mul),
    (0o177000, 0o071000, Opcode::Div),
    (0o177000, 0o072000, Opcode::Ash),
    (0o177000, 0o073000, Opcode::Ashc),
    (0o177000, 0o074000, Opcode::Xor),
    (0o177000, 0o077000, Opcode::Sob),
    (0o177400, 0o100000, Opcode::Bpl),
    (0o177400, 0o100400, Opcode::Bmi),
    (0o177400, 0o101000, Opcode::Bhi),
    (0o177400, 0o101400, Opcode::Blos),
    (0o177400, 0o102000, Opcode::Bvc),
    (0o177400, 0o102400, Opcode::Bvs),
    (0o177400, 0o103000, Opcode::Bcc),
    (0o177400, 0o103400, Opcode::Bcs),
    (0o177400, 0o104000, Opcode::Emt),
    (0o177400, 0o104400, Opcode::Trap),
    (0o170000, 0o170000, Opcode::Fpp),
];

/// Classifies a raw instruction word by scanning [`OPCODE_TABLE`].
#[must_use]
pub fn classify_opcode(word: u16) -> Opcode {
    OPCODE_TABLE
        .iter()
        .find(|(mask, pattern, _)| word & mask == *pattern)
        .map_or(Opcode::Reserved, |(_, _, opcode)| *opcode)
}

#[cfg(test)]
mod tests {
    use super::{classify_opcode, Opcode, OPCODE_TABLE};
    use rstest::rstest;

    #[rstest]
    #[case(0o000000, Opcode::Halt)]
    #[case(0o000007, Opcode::Reserved)]
    #[case(0o000137, Opcode::Jmp)]
    #[case(0o000207, Opcode::Rts)]
    #[case(0o000210, Opcode::Reserved)]
    #[case(0o000234, Opcode::Spl)]
    #[case(0o000257, Opcode::ConditionCode)]
    #[case(0o000277, Opcode::ConditionCode)]
    #[case(0o000301, Opcode::Swab)]
    #[case(0o000777, Opcode::Br)]
    #[case(0o004767, Opcode::Jsr)]
    #[case(0o005037, Opcode::Clr)]
    #[case(0o105037, Opcode::Clr)]
    #[case(0o006437, Opcode::Mark)]
    #[case(0o106437, Opcode::Reserved)]
    #[case(0o106537, Opcode::Mfp)]
    #[case(0o106737, Opcode::Reserved)]
    #[case(0o007000, Opcode::Reserved)]
    #[case(0o012737, Opcode::Mov)]
    #[case(0o112737, Opcode::Mov)]
    #[case(0o062737, Opcode::Add)]
    #[case(0o162737, Opcode::Sub)]
    #[case(0o070102, Opcode::Mul)]
    #[case(0o074102, Opcode::Xor)]
    #[case(0o075000, Opcode::Reserved)]
    #[case(0o076000, Opcode::Reserved)]
    #[case(0o077102, Opcode::Sob)]
    #[case(0o103777, Opcode::Bcs)]
    #[case(0o104377, Opcode::Emt)]
    #[case(0o104400, Opcode::Trap)]
    #[case(0o170000, Opcode::Fpp)]
    #[case(0o177777, Opcode::Fpp)]
    fn words_classify_in_priority_order(#[case] word: u16, #[case] opcode: Opcode) {
        assert_eq!(classify_opcode(word), opcode);
    }

    #[test]
    fn table_patterns_fit_their_masks() {
        for (mask, pattern, opcode) in OPCODE_TABLE {
            assert_eq!(pattern & !mask, 0, "{opcode:?} pattern outside mask");
        }
    }

    #[test]
    fn byte_forms_are_only_word_variants() {
        for word in 0o100000..=0o177777_u16 {
            let opcode = classify_opcode(word);
            if opcode.has_byte_form() {
                assert_eq!(classify_opcode(word & 0o077777), opcode);
            }
        }
    }
}
