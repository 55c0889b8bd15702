//! Root frames
//!
//! A [`Root`] owns one arena and the root frame drawn from it, with the
//! builtins bound in its `env`. Everything read or evaluated through a root
//! lives in that root's arena, so separate roots share nothing and may run
//! on separate threads.

use crate::builtins::{Output, install, install_builtins, stdout_output};
use crate::config::RuntimeConfig;
use crate::eval::Evaluator;
use crate::reader::Reader;
use plisp_core::{Arena, ArenaStats, Elem, Key, LispError, Native, print_elem};
use std::sync::Arc;
use tracing::debug;

pub struct Root {
    arena: Arena,
    frame: Elem,
    config: RuntimeConfig,
    reader: Reader,
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("arena", &self.arena)
            .field("config", &self.config)
            .finish()
    }
}

impl Root {
    /// Default configuration, `println` writing to stdout
    pub fn new() -> Result<Self, LispError> {
        Self::with_config(RuntimeConfig::default(), stdout_output())
    }

    pub fn with_config(config: RuntimeConfig, out: Output) -> Result<Self, LispError> {
        let mut arena = Arena::new(config.arena_capacity);
        let frame = arena.new_root_frame()?;
        let frame = install_builtins(&mut arena, frame, out)?;
        debug!(
            arena = arena.id().get(),
            live = arena.stats().live,
            "root frame ready"
        );
        Ok(Root {
            arena,
            frame,
            reader: Reader::new(&config),
            config,
        })
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn frame(&self) -> Elem {
        self.frame
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Bind an extra native in the root `env`
    pub fn register(&mut self, native: Arc<dyn Native>) -> Result<(), LispError> {
        self.frame = install(&mut self.arena, self.frame, native)?;
        Ok(())
    }

    /// Bind `name` to `value` in the root `env`
    pub fn define(&mut self, name: &str, value: Elem) -> Result<(), LispError> {
        let key = self.arena.new_ident(self.frame, name.as_bytes())?;
        self.frame = self.arena.env_set(self.frame, key, value)?;
        Ok(())
    }

    /// Look up `name` in the root `env`
    pub fn lookup(&self, name: &str) -> Elem {
        let env = self.arena.frame_get(self.frame, Key::Env);
        self.arena
            .map_visible(env)
            .into_iter()
            .find(|(k, _)| self.arena.bytes(*k) == Some(name.as_bytes()))
            .map_or(Elem::Nil, |(_, v)| v)
    }

    pub fn read(&mut self, text: &str) -> Result<Elem, LispError> {
        self.reader.read(&mut self.arena, self.frame, text)
    }

    pub fn read_all(&mut self, text: &str) -> Result<Vec<Elem>, LispError> {
        self.reader.read_all(&mut self.arena, self.frame, text)
    }

    /// Evaluate `term` against the root `env` and return its value.
    ///
    /// The root frame itself is unchanged afterwards; frame versions built
    /// during a successful evaluation are recycled.
    pub fn eval(&mut self, term: Elem) -> Result<Elem, LispError> {
        let errors = self.arena.errors_raised();
        let frame = self.arena.frame_set(self.frame, Key::Lhs, Elem::EmptyList)?;
        let frame = self.arena.frame_set(frame, Key::Rhs, term)?;

        let mut evaluator = Evaluator::new(&mut self.arena, &self.config).with_base(self.frame);
        let done = evaluator.run(frame)?;
        let steps = evaluator.steps();

        let value = self.arena.frame_get(done, Key::Lhs);
        if self.config.recycle && self.arena.errors_raised() == errors {
            let freed = self.arena.free_map_spine(done, self.frame);
            debug!(steps, freed, "eval finished");
        } else {
            debug!(steps, "eval finished");
        }
        Ok(value)
    }

    /// Read every term of `text` and evaluate them in order. Returns the
    /// last value, or Nil when `text` holds no terms.
    pub fn run(&mut self, text: &str) -> Result<Elem, LispError> {
        let mut value = Elem::Nil;
        for term in self.read_all(text)? {
            value = self.eval(term)?;
        }
        Ok(value)
    }

    pub fn print(&self, elem: Elem) -> String {
        print_elem(&self.arena, elem)
    }

    pub fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    /// Release the arena and everything in it
    pub fn free(self) -> ArenaStats {
        self.arena.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn root() -> (Root, Capture) {
        let capture = Capture::default();
        let out: Output = Arc::new(Mutex::new(Box::new(capture.clone())));
        let root = Root::with_config(RuntimeConfig::default(), out).unwrap();
        (root, capture)
    }

    #[test]
    fn test_eval_leaves_root_frame_alone() {
        let (mut root, _) = root();
        let frame = root.frame();
        let term = root.read("(add 1 2)").unwrap();
        let value = root.eval(term).unwrap();
        assert_eq!(root.print(value), "3");
        assert_eq!(root.frame(), frame);
        assert_eq!(root.arena().frame_get(frame, Key::Rhs), Elem::EmptyList);
    }

    #[test]
    fn test_run_returns_last_value() {
        let (mut root, capture) = root();
        let value = root.run("(println \"a\") (add 2 2)").unwrap();
        assert_eq!(root.print(value), "4");
        assert_eq!(capture.0.lock().unwrap().as_slice(), b"a\n");
        assert_eq!(root.run("   ").unwrap(), Elem::Nil);
    }

    #[test]
    fn test_define_and_lookup() {
        let (mut root, _) = root();
        let v = root.read("7").unwrap();
        root.define("seven", v).unwrap();
        assert_eq!(root.lookup("seven"), v);
        let value = root.run("(add seven 1)").unwrap();
        assert_eq!(root.print(value), "8");
        assert_eq!(root.lookup("nothing"), Elem::Nil);
    }

    #[test]
    fn test_free_reports_stats() {
        let (mut root, _) = root();
        root.run("(add 1 1)").unwrap();
        let stats = root.free();
        assert_eq!(stats.capacity, 1000);
        assert!(stats.live > 0);
        assert!(stats.high_water >= stats.live);
    }
}
