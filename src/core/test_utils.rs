//! Test utilities for arena-based testing.
//!
//! Each test gets its own arena, mirroring how an embedder scopes one
//! compilation unit to one session.

#[cfg(test)]
pub mod test {
    use super::super::session::CompilationSession;
    use bumpalo::Bump;

    /// Test context that owns the arena backing a session.
    pub struct TestContext {
        arena: Bump,
    }

    impl TestContext {
        pub fn new() -> Self {
            Self { arena: Bump::new() }
        }

        /// Create a compilation session using this context's arena.
        ///
        /// The returned session borrows from the TestContext, so the
        /// TestContext must outlive the session.
        pub fn create_session(&self) -> CompilationSession<'_> {
            CompilationSession::new(&self.arena)
        }
    }

    impl Default for TestContext {
        fn default() -> Self {
            Self::new()
        }
    }

    #[test]
    fn test_sessions_share_the_context_arena() {
        let ctx = TestContext::new();
        let first = ctx.create_session().intern_str("a_rather_long_symbol_name");
        let second = ctx.create_session().intern_str("a_rather_long_symbol_name");
        // separate sessions intern separately but both outlive their session
        assert_eq!(first, second);
        assert_ne!(first.as_ptr(), second.as_ptr());
    }
}
