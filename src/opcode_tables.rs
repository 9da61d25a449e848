//! Instruction descriptors
//!
//! Every mnemonic the interpreter knows is a variant of [`Opcode`]. The
//! tables below map an opcode number in each operand-count class to its
//! mnemonic, and [`Opcode::requirement`] gives the trailing fields an
//! instruction carries for a given story version.

use crate::instruction::OperandCount;

/// Fields that follow the operands of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandRequirement {
    None,
    Store,
    Branch,
    StoreAndBranch,
    LiteralString,
}

/// Closed set of Z-machine instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // 2OP
    Je,
    Jl,
    Jg,
    DecChk,
    IncChk,
    Jin,
    Test,
    Or,
    And,
    TestAttr,
    SetAttr,
    ClearAttr,
    Store,
    InsertObj,
    Loadw,
    Loadb,
    GetProp,
    GetPropAddr,
    GetNextProp,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Call2s,
    Call2n,
    SetColour,
    Throw,
    // 1OP
    Jz,
    GetSibling,
    GetChild,
    GetParent,
    GetPropLen,
    Inc,
    Dec,
    PrintAddr,
    Call1s,
    RemoveObj,
    PrintObj,
    Ret,
    Jump,
    PrintPaddr,
    Load,
    Not,
    Call1n,
    // 0OP
    Rtrue,
    Rfalse,
    Print,
    PrintRet,
    Nop,
    Save,
    Restore,
    Restart,
    RetPopped,
    Pop,
    Catch,
    Quit,
    NewLine,
    ShowStatus,
    Verify,
    Piracy,
    // VAR
    CallVs,
    Storew,
    Storeb,
    PutProp,
    Sread,
    PrintChar,
    PrintNum,
    Random,
    Push,
    Pull,
    SplitWindow,
    SetWindow,
    CallVs2,
    EraseWindow,
    EraseLine,
    SetCursor,
    GetCursor,
    SetTextStyle,
    BufferMode,
    OutputStream,
    InputStream,
    SoundEffect,
    ReadChar,
    ScanTable,
    CallVn,
    CallVn2,
    Tokenise,
    EncodeText,
    CopyTable,
    PrintTable,
    CheckArgCount,
    // EXT
    LogShift,
    ArtShift,
    SetFont,
    DrawPicture,
    PictureData,
    ErasePicture,
    SetMargins,
    SaveUndo,
    RestoreUndo,
    PrintUnicode,
    CheckUnicode,
    SetTrueColour,
    MoveWindow,
    WindowSize,
    WindowStyle,
    GetWindProp,
    ScrollWindow,
    PopStack,
    ReadMouse,
    MouseWindow,
    PushStack,
    PutWindProp,
    PrintForm,
    MakeMenu,
    PictureTable,
    BufferScreen,
}

use Opcode::*;

const TWO_OP: [Option<Opcode>; 32] = [
    None,
    Some(Je),
    Some(Jl),
    Some(Jg),
    Some(DecChk),
    Some(IncChk),
    Some(Jin),
    Some(Test),
    Some(Or),
    Some(And),
    Some(TestAttr),
    Some(SetAttr),
    Some(ClearAttr),
    Some(Store),
    Some(InsertObj),
    Some(Loadw),
    Some(Loadb),
    Some(GetProp),
    Some(GetPropAddr),
    Some(GetNextProp),
    Some(Add),
    Some(Sub),
    Some(Mul),
    Some(Div),
    Some(Mod),
    Some(Call2s),
    Some(Call2n),
    Some(SetColour),
    Some(Throw),
    None,
    None,
    None,
];

const ONE_OP: [Opcode; 16] = [
    Jz, GetSibling, GetChild, GetParent, GetPropLen, Inc, Dec, PrintAddr, Call1s, RemoveObj,
    PrintObj, Ret, Jump, PrintPaddr, Load, Not,
];

const ZERO_OP: [Option<Opcode>; 16] = [
    Some(Rtrue),
    Some(Rfalse),
    Some(Print),
    Some(PrintRet),
    Some(Nop),
    Some(Save),
    Some(Restore),
    Some(Restart),
    Some(RetPopped),
    Some(Pop),
    Some(Quit),
    Some(NewLine),
    Some(ShowStatus),
    Some(Verify),
    None,
    Some(Piracy),
];

const VAR_OP: [Opcode; 32] = [
    CallVs, Storew, Storeb, PutProp, Sread, PrintChar, PrintNum, Random, Push, Pull,
    SplitWindow, SetWindow, CallVs2, EraseWindow, EraseLine, SetCursor, GetCursor,
    SetTextStyle, BufferMode, OutputStream, InputStream, SoundEffect, ReadChar, ScanTable, Not,
    CallVn, CallVn2, Tokenise, EncodeText, CopyTable, PrintTable, CheckArgCount,
];

const EXT_OP: [Option<Opcode>; 30] = [
    Some(Save),
    Some(Restore),
    Some(LogShift),
    Some(ArtShift),
    Some(SetFont),
    Some(DrawPicture),
    Some(PictureData),
    Some(ErasePicture),
    Some(SetMargins),
    Some(SaveUndo),
    Some(RestoreUndo),
    Some(PrintUnicode),
    Some(CheckUnicode),
    Some(SetTrueColour),
    None,
    None,
    Some(MoveWindow),
    Some(WindowSize),
    Some(WindowStyle),
    Some(GetWindProp),
    Some(ScrollWindow),
    Some(PopStack),
    Some(ReadMouse),
    Some(MouseWindow),
    Some(PushStack),
    Some(PutWindProp),
    Some(PrintForm),
    Some(MakeMenu),
    Some(PictureTable),
    Some(BufferScreen),
];

/// Look up the mnemonic for an opcode number within its operand-count class.
/// For `OperandCount::EXT` the number is the second opcode byte.
pub fn lookup(count: OperandCount, number: u8, version: u8) -> Option<Opcode> {
    match count {
        OperandCount::OP2 => TWO_OP[(number & 0x1f) as usize],
        OperandCount::OP1 => match ONE_OP[(number & 0x0f) as usize] {
            Not if version >= 5 => Some(Call1n),
            op => Some(op),
        },
        OperandCount::OP0 => match ZERO_OP[(number & 0x0f) as usize] {
            Some(Pop) if version >= 5 => Some(Catch),
            op => op,
        },
        OperandCount::VAR => match VAR_OP[(number & 0x1f) as usize] {
            // VAR not only exists from v5; earlier stories use the 1OP form
            Not if version < 5 => None,
            op => Some(op),
        },
        OperandCount::EXT => EXT_OP.get(number as usize).copied().flatten(),
    }
}

impl Opcode {
    /// Trailing fields of this instruction in a story of the given version
    pub fn requirement(self, version: u8) -> OperandRequirement {
        use OperandRequirement as R;
        match self {
            Save if version <= 4 => R::Branch,
            Restore if version <= 3 => R::Branch,
            Save | Restore => R::Store,
            Sread if version >= 5 => R::Store,
            Pull if version == 6 => R::Store,

            Je | Jl | Jg | DecChk | IncChk | Jin | Test | TestAttr | Jz | Verify | Piracy
            | CheckArgCount | PictureData | PushStack | MakeMenu => R::Branch,

            GetSibling | GetChild | ScanTable => R::StoreAndBranch,

            Or | And | Loadw | Loadb | GetProp | GetPropAddr | GetNextProp | Add | Sub | Mul
            | Div | Mod | Call2s | GetParent | GetPropLen | Call1s | Load | Not | Catch
            | CallVs | CallVs2 | Random | ReadChar | LogShift | ArtShift | SetFont | SaveUndo
            | RestoreUndo | CheckUnicode | GetWindProp | BufferScreen => R::Store,

            Print | PrintRet => R::LiteralString,

            _ => R::None,
        }
    }

    /// Whether the engine executes this instruction at all
    pub fn is_supported(self, version: u8) -> bool {
        match self {
            SetFont | DrawPicture | PictureData | ErasePicture | SetMargins | MoveWindow
            | WindowSize | WindowStyle | GetWindProp | ScrollWindow | PopStack | ReadMouse
            | MouseWindow | PushStack | PutWindProp | PrintForm | MakeMenu | PictureTable
            | BufferScreen | InputStream | SoundEffect => false,
            Pull => version != 6,
            _ => true,
        }
    }

    /// First story version that has this instruction
    pub fn introduced(self) -> u8 {
        match self {
            ShowStatus | Verify | SplitWindow | SetWindow | OutputStream | InputStream
            | SoundEffect => 3,
            Call2s | Call1s | CallVs2 | EraseWindow | EraseLine | SetCursor | GetCursor
            | SetTextStyle | BufferMode | ReadChar | ScanTable => 4,
            Call2n | SetColour | Throw | Call1n | Catch | Piracy | CallVn | CallVn2 | Tokenise
            | EncodeText | CopyTable | PrintTable | CheckArgCount => 5,
            _ => 1,
        }
    }

    /// Two operand-type bytes follow the opcode
    pub fn is_double_variable(self) -> bool {
        matches!(self, CallVs2 | CallVn2)
    }

    /// Standard mnemonic
    pub fn name(self) -> &'static str {
        match self {
            Je => "je",
            Jl => "jl",
            Jg => "jg",
            DecChk => "dec_chk",
            IncChk => "inc_chk",
            Jin => "jin",
            Test => "test",
            Or => "or",
            And => "and",
            TestAttr => "test_attr",
            SetAttr => "set_attr",
            ClearAttr => "clear_attr",
            Store => "store",
            InsertObj => "insert_obj",
            Loadw => "loadw",
            Loadb => "loadb",
            GetProp => "get_prop",
            GetPropAddr => "get_prop_addr",
            GetNextProp => "get_next_prop",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            Call2s => "call_2s",
            Call2n => "call_2n",
            SetColour => "set_colour",
            Throw => "throw",
            Jz => "jz",
            GetSibling => "get_sibling",
            GetChild => "get_child",
            GetParent => "get_parent",
            GetPropLen => "get_prop_len",
            Inc => "inc",
            Dec => "dec",
            PrintAddr => "print_addr",
            Call1s => "call_1s",
            RemoveObj => "remove_obj",
            PrintObj => "print_obj",
            Ret => "ret",
            Jump => "jump",
            PrintPaddr => "print_paddr",
            Load => "load",
            Not => "not",
            Call1n => "call_1n",
            Rtrue => "rtrue",
            Rfalse => "rfalse",
            Print => "print",
            PrintRet => "print_ret",
            Nop => "nop",
            Save => "save",
            Restore => "restore",
            Restart => "restart",
            RetPopped => "ret_popped",
            Pop => "pop",
            Catch => "catch",
            Quit => "quit",
            NewLine => "new_line",
            ShowStatus => "show_status",
            Verify => "verify",
            Piracy => "piracy",
            CallVs => "call_vs",
            Storew => "storew",
            Storeb => "storeb",
            PutProp => "put_prop",
            Sread => "sread",
            PrintChar => "print_char",
            PrintNum => "print_num",
            Random => "random",
            Push => "push",
            Pull => "pull",
            SplitWindow => "split_window",
            SetWindow => "set_window",
            CallVs2 => "call_vs2",
            EraseWindow => "erase_window",
            EraseLine => "erase_line",
            SetCursor => "set_cursor",
            GetCursor => "get_cursor",
            SetTextStyle => "set_text_style",
            BufferMode => "buffer_mode",
            OutputStream => "output_stream",
            InputStream => "input_stream",
            SoundEffect => "sound_effect",
            ReadChar => "read_char",
            ScanTable => "scan_table",
            CallVn => "call_vn",
            CallVn2 => "call_vn2",
            Tokenise => "tokenise",
            EncodeText => "encode_text",
            CopyTable => "copy_table",
            PrintTable => "print_table",
            CheckArgCount => "check_arg_count",
            LogShift => "log_shift",
            ArtShift => "art_shift",
            SetFont => "set_font",
            DrawPicture => "draw_picture",
            PictureData => "picture_data",
            ErasePicture => "erase_picture",
            SetMargins => "set_margins",
            SaveUndo => "save_undo",
            RestoreUndo => "restore_undo",
            PrintUnicode => "print_unicode",
            CheckUnicode => "check_unicode",
            SetTrueColour => "set_true_colour",
            MoveWindow => "move_window",
            WindowSize => "window_size",
            WindowStyle => "window_style",
            GetWindProp => "get_wind_prop",
            ScrollWindow => "scroll_window",
            PopStack => "pop_stack",
            ReadMouse => "read_mouse",
            MouseWindow => "mouse_window",
            PushStack => "push_stack",
            PutWindProp => "put_wind_prop",
            PrintForm => "print_form",
            MakeMenu => "make_menu",
            PictureTable => "picture_table",
            BufferScreen => "buffer_screen",
        }
    }
}
