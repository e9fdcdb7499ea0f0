//! Plain-text listing of everything bound to scripts.
//!
//! Each class records its members as they are bound. [`binding_doc`] renders
//! every class alphabetically:
//!
//! ```text
//! class Point (Point_mt) [demo::Point]
//!     constructor Point(f64) -> Point
//!     method scale(f64)
//!     field x: f64 [read, write]
//!     operator __add(Point, Point) -> Point
//! ```

use std::fmt::Write as _;
use std::path::Path;

use bitflags::bitflags;

use crate::class::BoundType;
use crate::error::BindError;
use crate::signature::{Signature, short_type_name};

bitflags! {
    /// How a script may use a bound member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ = 1;
        const WRITE = 1 << 1;
        const CALL = 1 << 2;
    }
}

/// Where a member is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRole {
    Constructor,
    Callable,
    Field,
    Operator,
}

/// One bound member of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDoc {
    pub name: String,
    pub role: MemberRole,
    pub access: Access,
    pub signature: Signature,
}

impl MemberDoc {
    pub fn callable(name: &str, role: MemberRole, signature: Signature) -> Self {
        Self {
            name: name.to_string(),
            role,
            access: Access::CALL,
            signature,
        }
    }

    pub fn field(name: &str, access: Access, signature: Signature) -> Self {
        Self {
            name: name.to_string(),
            role: MemberRole::Field,
            access,
            signature,
        }
    }

    fn render(&self, out: &mut String) {
        let _ = match self.role {
            MemberRole::Field => {
                let mut modes = Vec::new();
                if self.access.contains(Access::READ) {
                    modes.push("read");
                }
                if self.access.contains(Access::WRITE) {
                    modes.push("write");
                }
                writeln!(
                    out,
                    "    field {}: {} [{}]",
                    self.name,
                    short_type_name(self.signature.output),
                    modes.join(", ")
                )
            }
            MemberRole::Constructor => {
                writeln!(out, "    constructor {}{}", self.name, self.signature)
            }
            MemberRole::Operator => writeln!(out, "    operator {}{}", self.name, self.signature),
            MemberRole::Callable => writeln!(
                out,
                "    {} {}{}",
                self.signature.kind, self.name, self.signature
            ),
        };
    }
}

/// Render every bound class.
pub fn binding_doc() -> String {
    let mut classes: Vec<_> = BoundType::all()
        .into_iter()
        .filter_map(|class| class.identity().map(|identity| (identity, class)))
        .collect();
    classes.sort_by(|a, b| a.0.name.cmp(&b.0.name));

    let mut out = String::new();
    for (identity, class) in classes {
        let _ = writeln!(
            out,
            "class {} ({}) [{}]",
            identity.name,
            identity.mt_name,
            class.rust_name()
        );
        for member in class.members() {
            member.render(&mut out);
        }
        out.push('\n');
    }
    out
}

/// Write [`binding_doc`] to `path`.
pub fn write_binding_doc(path: &Path) -> Result<(), BindError> {
    std::fs::write(path, binding_doc()).map_err(|source| BindError::Io {
        path: path.to_path_buf(),
        source,
    })
}
