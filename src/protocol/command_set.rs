use bitflags::bitflags;

use super::CommandKind;

bitflags! {
    /// Optional commands a loader is willing to accept.
    ///
    /// `Data`, `Address` and `End` are always accepted. A tag whose command
    /// is disabled here is treated exactly like an unknown tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandSet: u8 {
        /// `'S'` Thumb-2 `MOVW`/`MOVT` fixups.
        const SPLIT_IMMEDIATE = 1 << 0;
        /// `'O'` runtime offset injection.
        const INJECT_OFFSET = 1 << 1;
    }
}

impl Default for CommandSet {
    fn default() -> CommandSet {
        CommandSet::all()
    }
}

impl CommandSet {
    /// Check whether records of `kind` are accepted.
    pub fn accepts(self, kind: CommandKind) -> bool {
        match kind {
            CommandKind::Data | CommandKind::Address | CommandKind::End => true,
            CommandKind::SplitImmediate => self.contains(CommandSet::SPLIT_IMMEDIATE),
            CommandKind::InjectOffset => self.contains(CommandSet::INJECT_OFFSET),
        }
    }
}
