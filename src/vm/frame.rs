use std::rc::Rc;

use crate::code::Instructions;
use crate::value::Closure;

/// An activation record: the running closure, its instruction pointer,
/// and the stack slot its locals start at.
#[derive(Clone, Debug)]
pub(crate) struct Frame {
    pub(crate) closure: Rc<Closure>,
    /// Starts at -1; the dispatch loop pre-increments before fetching.
    pub(crate) ip: isize,
    pub(crate) base_pointer: usize,
}

impl Frame {
    pub(crate) fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    #[inline]
    pub(crate) fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}
