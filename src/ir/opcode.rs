// This module defines the IR opcode set. Opcodes are specialised by the static types of
// their operands: arithmetic, comparison and index operations come in a generic form that
// dispatches on tagged values at run time plus integer/float forms (suffixes ii, if, fi,
// ff) the code generator lowers to plain C arithmetic. Opcode::info() returns the static
// description of each opcode (printed name, family used for code generation dispatch,
// terminator flag). store_counterpart() is the fixed load-to-store mapping used when an
// indexed load turns out to be an assignment target.

//! IR opcodes and their static properties.

use std::fmt;

/// Opcode group used by the code generator dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpFamily {
    Control,
    Move,
    Arith,
    Bitwise,
    Compare,
    Unary,
    Cast,
    Load,
    Store,
    Call,
    Closure,
    Constructor,
}

/// Static description of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub name: &'static str,
    pub family: OpFamily,
    pub is_terminator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Ret,
    Br,
    Cbr,

    Mov,
    MovI,
    MovF,
    MovIF,
    MovFI,

    Closure,
    Call,
    NewTable,
    NewIArray,
    NewFArray,

    Add,
    AddFF,
    AddIF,
    AddII,
    Sub,
    SubFF,
    SubFI,
    SubIF,
    SubII,
    Mul,
    MulFF,
    MulIF,
    MulII,
    Div,
    DivFF,
    DivFI,
    DivIF,
    DivII,
    IDiv,
    Mod,
    Pow,
    Concat,

    BAnd,
    BAndII,
    BOr,
    BOrII,
    BXor,
    BXorII,
    Shl,
    ShlII,
    Shr,
    ShrII,

    Eq,
    EqII,
    EqFF,
    Lt,
    LtII,
    LtFF,
    Le,
    LeII,
    LeFF,

    Unm,
    UnmI,
    UnmF,
    Not,
    Len,
    LenI,
    BNot,

    ToInt,
    ToFlt,
    ToIArray,
    ToFArray,
    ToTable,
    ToString,
    ToClosure,

    LoadGlobal,
    Get,
    GetIK,
    GetSK,
    TableGet,
    TableGetIK,
    TableGetSK,
    IArrayGet,
    FArrayGet,

    StoreGlobal,
    Put,
    PutIK,
    PutSK,
    TableSet,
    TableSetIK,
    TableSetSK,
    IArraySet,
    FArraySet,
}

impl Opcode {
    pub const fn info(self) -> OpInfo {
        use OpFamily as F;
        use Opcode::*;
        let (name, family) = match self {
            Ret => ("RET", F::Control),
            Br => ("BR", F::Control),
            Cbr => ("CBR", F::Control),

            Mov => ("MOV", F::Move),
            MovI => ("MOVi", F::Move),
            MovF => ("MOVf", F::Move),
            MovIF => ("MOVif", F::Move),
            MovFI => ("MOVfi", F::Move),

            Closure => ("CLOSURE", F::Closure),
            Call => ("CALL", F::Call),
            NewTable => ("NEWTABLE", F::Constructor),
            NewIArray => ("NEWIARRAY", F::Constructor),
            NewFArray => ("NEWFARRAY", F::Constructor),

            Add => ("ADD", F::Arith),
            AddFF => ("ADDff", F::Arith),
            AddIF => ("ADDif", F::Arith),
            AddII => ("ADDii", F::Arith),
            Sub => ("SUB", F::Arith),
            SubFF => ("SUBff", F::Arith),
            SubFI => ("SUBfi", F::Arith),
            SubIF => ("SUBif", F::Arith),
            SubII => ("SUBii", F::Arith),
            Mul => ("MUL", F::Arith),
            MulFF => ("MULff", F::Arith),
            MulIF => ("MULif", F::Arith),
            MulII => ("MULii", F::Arith),
            Div => ("DIV", F::Arith),
            DivFF => ("DIVff", F::Arith),
            DivFI => ("DIVfi", F::Arith),
            DivIF => ("DIVif", F::Arith),
            DivII => ("DIVii", F::Arith),
            IDiv => ("IDIV", F::Arith),
            Mod => ("MOD", F::Arith),
            Pow => ("POW", F::Arith),
            Concat => ("CONCAT", F::Arith),

            BAnd => ("BAND", F::Bitwise),
            BAndII => ("BANDii", F::Bitwise),
            BOr => ("BOR", F::Bitwise),
            BOrII => ("BORii", F::Bitwise),
            BXor => ("BXOR", F::Bitwise),
            BXorII => ("BXORii", F::Bitwise),
            Shl => ("SHL", F::Bitwise),
            ShlII => ("SHLii", F::Bitwise),
            Shr => ("SHR", F::Bitwise),
            ShrII => ("SHRii", F::Bitwise),

            Eq => ("EQ", F::Compare),
            EqII => ("EQii", F::Compare),
            EqFF => ("EQff", F::Compare),
            Lt => ("LT", F::Compare),
            LtII => ("LTii", F::Compare),
            LtFF => ("LTff", F::Compare),
            Le => ("LE", F::Compare),
            LeII => ("LEii", F::Compare),
            LeFF => ("LEff", F::Compare),

            Unm => ("UNM", F::Unary),
            UnmI => ("UNMi", F::Unary),
            UnmF => ("UNMf", F::Unary),
            Not => ("NOT", F::Unary),
            Len => ("LEN", F::Unary),
            LenI => ("LENi", F::Unary),
            BNot => ("BNOT", F::Unary),

            ToInt => ("TOINT", F::Cast),
            ToFlt => ("TOFLT", F::Cast),
            ToIArray => ("TOIARRAY", F::Cast),
            ToFArray => ("TOFARRAY", F::Cast),
            ToTable => ("TOTABLE", F::Cast),
            ToString => ("TOSTRING", F::Cast),
            ToClosure => ("TOCLOSURE", F::Cast),

            LoadGlobal => ("LOADGLOBAL", F::Load),
            Get => ("GET", F::Load),
            GetIK => ("GETik", F::Load),
            GetSK => ("GETsk", F::Load),
            TableGet => ("TGET", F::Load),
            TableGetIK => ("TGETik", F::Load),
            TableGetSK => ("TGETsk", F::Load),
            IArrayGet => ("IAGET", F::Load),
            FArrayGet => ("FAGET", F::Load),

            StoreGlobal => ("STOREGLOBAL", F::Store),
            Put => ("PUT", F::Store),
            PutIK => ("PUTik", F::Store),
            PutSK => ("PUTsk", F::Store),
            TableSet => ("TPUT", F::Store),
            TableSetIK => ("TPUTik", F::Store),
            TableSetSK => ("TPUTsk", F::Store),
            IArraySet => ("IAPUT", F::Store),
            FArraySet => ("FAPUT", F::Store),
        };
        OpInfo {
            name,
            family,
            is_terminator: matches!(self, Ret | Br | Cbr),
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn is_terminator(self) -> bool {
        self.info().is_terminator
    }

    /// Store opcode an indexed load turns into when it is assigned to.
    pub fn store_counterpart(self) -> Option<Opcode> {
        use Opcode::*;
        Some(match self {
            LoadGlobal => StoreGlobal,
            Get => Put,
            GetIK => PutIK,
            GetSK => PutSK,
            TableGet => TableSet,
            TableGetIK => TableSetIK,
            TableGetSK => TableSetSK,
            IArrayGet => IArraySet,
            FArrayGet => FArraySet,
            _ => return None,
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
