// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
Module loading for `import a.b.c` statements.

A dotted path maps to `<root>/a/b/c.rx` under the program root (the
directory of the entry file). Each normalized path loads exactly once;
importing it again is a no-op. That rule is also what breaks import
cycles: a module importing back into a partially executed module simply
observes whatever has run so far.
*/

use crate::compiler;
use crate::lexer;
use crate::ops::Prog;
use crate::parser;
use crate::RxError;
use fnv::FnvHashSet;
use std::path::PathBuf;
use thiserror::Error;

/// The module file extension.
pub const MODULE_EXT: &str = "rx";

/// Fatal module loading failures; the process exits with code 2.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not import module `{dotted}`: no such file {path}")]
    NotFound { dotted: String, path: PathBuf },
    #[error("could not read module `{dotted}` from {path}: {source}")]
    Io {
        dotted: String,
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct ModuleLoader {
    root: PathBuf,
    loaded: FnvHashSet<String>,
}

impl ModuleLoader {
    pub fn new(root: PathBuf) -> Self {
        ModuleLoader { root, loaded: FnvHashSet::default() }
    }

    /// Where a dotted import path resolves to on disk.
    pub fn resolve(&self, dotted: &str) -> PathBuf {
        let mut path = self.root.clone();
        for seg in dotted.split('.') {
            path.push(seg);
        }
        path.set_extension(MODULE_EXT);
        path
    }

    /// Loads and compiles a module, or returns `None` when the path was
    /// already loaded. The caller executes the returned program; marking
    /// the path as loaded *before* that is what breaks import cycles.
    pub fn load(&mut self, dotted: &str) -> Result<Option<Prog>, RxError> {
        if !self.loaded.insert(dotted.to_string()) {
            return Ok(None);
        }

        let path = self.resolve(dotted);
        if !path.is_file() {
            return Err(LoadError::NotFound { dotted: dotted.to_string(), path }.into());
        }

        let source = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
            dotted: dotted.to_string(),
            path: path.clone(),
            source,
        })?;

        let tokens = lexer::tokenize(&source)?;
        let ast = parser::parse(tokens)?;
        let prog = compiler::compile(&ast)?;
        Ok(Some(prog))
    }
}
