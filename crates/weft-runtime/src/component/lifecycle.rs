#![forbid(unsafe_code)]

//! Lifecycle flags of a component.

bitflags::bitflags! {
    /// Which lifecycle stages currently hold.
    ///
    /// `INITED` holds from construction until disposal, `CREATED` from the
    /// first materialization until disposal. `ATTACHED` and `DETACHED` are
    /// exclusive. `DISPOSED` holds alone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lifecycle: u8 {
        const INITED   = 0b0000_0001;
        const CREATED  = 0b0000_0010;
        const ATTACHED = 0b0000_0100;
        const DETACHED = 0b0000_1000;
        const DISPOSED = 0b0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Inited,
    Created,
    Attached,
    Detached,
    Disposed,
}

impl Stage {
    const fn flag(self) -> Lifecycle {
        match self {
            Self::Inited => Lifecycle::INITED,
            Self::Created => Lifecycle::CREATED,
            Self::Attached => Lifecycle::ATTACHED,
            Self::Detached => Lifecycle::DETACHED,
            Self::Disposed => Lifecycle::DISPOSED,
        }
    }
}

impl Lifecycle {
    #[must_use]
    pub const fn is(self, stage: Stage) -> bool {
        self.contains(stage.flag())
    }

    /// Most advanced stage, for diagnostics.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        if self.contains(Self::DISPOSED) {
            "disposed"
        } else if self.contains(Self::ATTACHED) {
            "attached"
        } else if self.contains(Self::DETACHED) {
            "detached"
        } else if self.contains(Self::CREATED) {
            "created"
        } else {
            "inited"
        }
    }

    pub(crate) fn mark_attached(&mut self) {
        self.insert(Self::CREATED | Self::ATTACHED);
        self.remove(Self::DETACHED);
    }

    pub(crate) fn mark_created(&mut self) {
        self.insert(Self::CREATED);
    }

    pub(crate) fn mark_detached(&mut self) {
        self.remove(Self::ATTACHED);
        self.insert(Self::DETACHED);
    }

    pub(crate) fn mark_disposed(&mut self) {
        *self = Self::DISPOSED;
    }
}
