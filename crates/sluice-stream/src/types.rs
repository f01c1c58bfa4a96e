//! Data types carried by a step stream.

use sluice_core::{element_count, Buffer, Dtype, Element, Shape};

use crate::error::StreamError;

/// A variable declared in the stream header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarDecl {
    /// Variable name, unique within the stream.
    pub name: String,
    /// Element type of every block of this variable.
    pub dtype: Dtype,
    /// Global shape, or empty when blocks are ragged (shape known only
    /// per block).
    pub shape: Shape,
}

impl VarDecl {
    /// Declare a variable.
    pub fn new(name: impl Into<String>, dtype: Dtype, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape: Shape::from_slice(shape),
        }
    }
}

/// Stream header: a name and the variable declarations.
///
/// # Examples
///
/// ```
/// use sluice_core::Dtype;
/// use sluice_stream::{StreamHeader, VarDecl};
///
/// let header = StreamHeader::new("diffusion")
///     .with_var(VarDecl::new("i_dr_avg", Dtype::F64, &[128]));
/// assert_eq!(header.decl("i_dr_avg").unwrap().shape.as_slice(), &[128]);
/// assert!(header.decl("missing").is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHeader {
    /// Stream name.
    pub name: String,
    /// Declared variables in declaration order.
    pub decls: Vec<VarDecl>,
}

impl StreamHeader {
    /// A header with no declarations.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decls: Vec::new(),
        }
    }

    /// Append a declaration.
    pub fn with_var(mut self, decl: VarDecl) -> Self {
        self.decls.push(decl);
        self
    }

    /// Look up a declaration by name.
    pub fn decl(&self, name: &str) -> Option<&VarDecl> {
        self.decls.iter().find(|d| d.name == name)
    }
}

/// One block of one variable: a shape and its row-major elements.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Block shape.
    pub shape: Shape,
    /// Elements; `data.len()` equals the product of `shape`.
    pub data: Buffer,
}

impl Block {
    /// Number of elements implied by the shape.
    pub fn element_count(&self) -> usize {
        element_count(&self.shape)
    }
}

/// All blocks of one variable within a step.
#[derive(Clone, Debug, PartialEq)]
pub struct VarBlocks {
    /// Variable name.
    pub name: String,
    /// Element type shared by every block.
    pub dtype: Dtype,
    /// Blocks in write order.
    pub blocks: Vec<Block>,
}

impl VarBlocks {
    /// Concatenate every block into one vector, in block order.
    ///
    /// Returns `None` if `T` is not this variable's element type.
    pub fn concat<T: Element>(&self) -> Option<Vec<T>> {
        if T::DTYPE != self.dtype {
            return None;
        }
        let mut out = Vec::new();
        for block in &self.blocks {
            out.extend_from_slice(T::view(&block.data)?);
        }
        Some(out)
    }
}

/// One step's worth of stream data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepFrame {
    /// Step index as recorded by the producer.
    pub step: u64,
    /// Variables present in this step, in first-write order.
    pub vars: Vec<VarBlocks>,
}

impl StepFrame {
    /// An empty frame for `step`.
    pub fn new(step: u64) -> Self {
        Self {
            step,
            vars: Vec::new(),
        }
    }

    /// Append a block to `name`, creating the variable on first use.
    ///
    /// Blocks of one variable must share an element type; a block of a
    /// different type is rejected and returned.
    pub fn push_block(&mut self, name: &str, shape: &[usize], data: Buffer) -> Result<(), Buffer> {
        let dtype = data.dtype();
        let block = Block {
            shape: Shape::from_slice(shape),
            data,
        };
        match self.vars.iter_mut().find(|v| v.name == name) {
            Some(var) if var.dtype != dtype => Err(block.data),
            Some(var) => {
                var.blocks.push(block);
                Ok(())
            }
            None => {
                self.vars.push(VarBlocks {
                    name: name.to_string(),
                    dtype,
                    blocks: vec![block],
                });
                Ok(())
            }
        }
    }

    /// Look up a variable by name.
    pub fn var(&self, name: &str) -> Option<&VarBlocks> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Total number of blocks across all variables.
    pub fn block_count(&self) -> usize {
        self.vars.iter().map(|v| v.blocks.len()).sum()
    }

    /// Check that every block holds exactly as many elements as its
    /// shape implies.
    pub fn check_shapes(&self) -> Result<(), StreamError> {
        for var in &self.vars {
            for block in &var.blocks {
                if block.data.len() != block.element_count() {
                    return Err(StreamError::Malformed {
                        detail: format!(
                            "block of '{}' has shape {:?} but {} elements",
                            var.name,
                            block.shape.as_slice(),
                            block.data.len()
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A step frame.
    Step(StepFrame),
    /// The end-of-stream marker.
    End,
}
