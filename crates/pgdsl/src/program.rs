//! Database programs: leaves plus monadic composition.
//!
//! A [`Program<T>`] describes a sequence of statements whose later steps may
//! depend on earlier results. Building one performs no I/O; it runs only when
//! handed to an execution strategy (`run`, `run_captured`, `run_deferred`,
//! `stream`).
//!
//! ```ignore
//! use pgdsl::{Program, insert_into, select};
//!
//! let program = Program::update(insert_into(&test).values(test.fields()).bind(1, "a"))
//!     .and_then(Program::update(insert_into(&test).values(test.fields()).bind(2, "b")))
//!     .and_then(Program::query_iterable(
//!         select(test.fields()).from(&test).order_by(&id).bind(),
//!         test.decoder(),
//!     ));
//!
//! let rows: Vec<(i64, String)> = program.run(&backend)?;
//! ```

mod op;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{DslError, DslResult};
use crate::field::Field;
use crate::row::{Row, RowMetadata};
use crate::sql::Statement;
use crate::table::{FieldList, SchemaDrift, Table};
use crate::value::FromValue;

pub use op::OpKind;
pub(crate) use op::Op;

/// A step's result with its type erased; the `Program<T>` wrapper knows the type.
pub(crate) type Erased = Box<dyn Any + Send>;

/// Continuation of a bind: erased value in, next node out.
pub(crate) type Cont = Box<dyn FnOnce(Erased) -> Node + Send>;

pub(crate) enum Node {
    Pure(Erased),
    Fail(DslError),
    Suspend(Box<dyn FnOnce() -> Node + Send>),
    Step(Op<Node>),
    /// Run the head, then feed its value through the continuations in order.
    ///
    /// Binding onto a `Bind` appends to its list, so a chain of any length stays
    /// one level deep.
    Bind(Box<Node>, Vec<Cont>),
}

impl Node {
    fn pure<T: Send + 'static>(value: T) -> Node {
        Node::Pure(Box::new(value))
    }

    /// The node that runs first.
    fn head(&self) -> &Node {
        match self {
            Node::Bind(head, _) => head,
            other => other,
        }
    }
}

/// Recover a value erased by a node of `Program<T>`.
pub(crate) fn unerase<T: 'static>(value: Erased) -> DslResult<T> {
    value.downcast::<T>().map(|value| *value).map_err(|_| {
        DslError::Other(format!(
            "program produced a value that is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

/// A composable description of database work producing `T`.
#[must_use = "programs do nothing until run"]
pub struct Program<T> {
    node: Node,
    _value: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Program<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = match &self.node {
            Node::Bind(_, conts) => conts.len(),
            _ => 0,
        };
        match self.node.head() {
            Node::Pure(_) | Node::Bind(..) => f.write_str("Program::Pure")?,
            Node::Fail(error) => f.debug_tuple("Program::Fail").field(error).finish()?,
            Node::Suspend(_) => f.write_str("Program::Suspend")?,
            Node::Step(op) => f
                .debug_struct("Program::Step")
                .field("kind", &op.kind())
                .field("sql", &op.statement().sql())
                .finish()?,
        }
        if pending > 0 {
            write!(f, " then {pending} more")?;
        }
        Ok(())
    }
}

impl<T: Send + 'static> Program<T> {
    fn from_node(node: Node) -> Self {
        Self {
            node,
            _value: PhantomData,
        }
    }

    fn step(op: Op<Node>) -> Self {
        Self::from_node(Node::Step(op))
    }

    pub(crate) fn into_node(self) -> Node {
        self.node
    }

    /// A program that yields `value` without touching the database.
    pub fn pure(value: T) -> Self {
        Self::from_node(Node::pure(value))
    }

    /// A program that fails with `error` when run.
    pub fn fail(error: DslError) -> Self {
        Self::from_node(Node::Fail(error))
    }

    /// Build the program only when execution reaches it.
    pub fn suspend(thunk: impl FnOnce() -> Program<T> + Send + 'static) -> Self {
        Self::from_node(Node::Suspend(Box::new(move || thunk().node)))
    }

    /// Exactly one row decoded with `mapper`; zero rows fail with `NotFound`.
    pub fn query<F>(statement: impl Into<Statement>, mapper: F) -> Self
    where
        F: FnOnce(&Row) -> DslResult<T> + Send + 'static,
    {
        Self::step(Op::Query {
            statement: statement.into(),
            next: Box::new(move |row| mapper(&row).map(Node::pure)),
        })
    }

    /// Run a query for its result layout only; no row is read.
    pub fn query_meta<F>(statement: impl Into<Statement>, mapper: F) -> Self
    where
        F: FnOnce(&RowMetadata) -> DslResult<T> + Send + 'static,
    {
        Self::step(Op::QueryMeta {
            statement: statement.into(),
            next: Box::new(move |metadata| mapper(metadata.as_ref()).map(Node::pure)),
        })
    }

    /// Kind and statement of the next leaf, if it is already known.
    pub fn describe(&self) -> Option<(OpKind, &Statement)> {
        match self.node.head() {
            Node::Step(op) => Some((op.kind(), op.statement())),
            _ => None,
        }
    }

    /// Run `self`, then the program `f` builds from its result.
    ///
    /// `f` is called only after `self` succeeds; a failure skips it entirely.
    pub fn then<U, F>(self, f: F) -> Program<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Program<U> + Send + 'static,
    {
        let next: Cont = Box::new(move |value| match unerase::<T>(value) {
            Ok(value) => f(value).node,
            Err(error) => Node::Fail(error),
        });
        let node = match self.node {
            Node::Fail(error) => Node::Fail(error),
            Node::Bind(head, mut conts) => {
                conts.push(next);
                Node::Bind(head, conts)
            }
            head => Node::Bind(Box::new(head), vec![next]),
        };
        Program::from_node(node)
    }

    /// Run `self`, discard its result, then run `next`.
    pub fn and_then<U: Send + 'static>(self, next: Program<U>) -> Program<U> {
        self.then(move |_| next)
    }

    pub fn map<U, F>(self, f: F) -> Program<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then(move |value| Program::pure(f(value)))
    }

    /// Fail the program when `f` rejects the value.
    pub fn try_map<U, F>(self, f: F) -> Program<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> DslResult<U> + Send + 'static,
    {
        self.then(move |value| match f(value) {
            Ok(mapped) => Program::pure(mapped),
            Err(error) => Program::fail(error),
        })
    }
}

impl Program<()> {
    /// Execute an update and discard its row count.
    pub fn update(statement: impl Into<Statement>) -> Self {
        Self::step(Op::Update {
            statement: statement.into(),
            next: Box::new(|_count| Ok(Node::pure(()))),
        })
    }
}

impl Program<u64> {
    /// Execute an update and yield its row count.
    pub fn update_count(statement: impl Into<Statement>) -> Self {
        Self::step(Op::Update {
            statement: statement.into(),
            next: Box::new(|count| Ok(Node::pure(count))),
        })
    }
}

impl<T: Send + 'static> Program<Option<T>> {
    /// Execute an update in its own transaction and read back `field` from the
    /// affected row (typically a generated key).
    pub fn update_returning(statement: impl Into<Statement>, field: &Field<T>) -> Self
    where
        T: FromValue,
    {
        let field = field.clone();
        Self::step(Op::UpdateReturning {
            statement: statement.into(),
            column: field.column(),
            next: Box::new(move |row| {
                let value = row.map(|row| row.get(&field)).transpose()?;
                Ok(Node::pure(value))
            }),
        })
    }

    /// The first row decoded with `mapper`, if any.
    pub fn query_one<F>(statement: impl Into<Statement>, mapper: F) -> Self
    where
        F: FnOnce(&Row) -> DslResult<T> + Send + 'static,
    {
        Self::step(Op::QueryOne {
            statement: statement.into(),
            next: Box::new(move |row| {
                let value = row.map(|row| mapper(&row)).transpose()?;
                Ok(Node::pure(value))
            }),
        })
    }
}

impl<T: Send + 'static> Program<Vec<T>> {
    /// Every row decoded with `mapper`, in backend order.
    pub fn query_iterable<F>(statement: impl Into<Statement>, mapper: F) -> Self
    where
        F: Fn(&Row) -> DslResult<T> + Send + 'static,
    {
        Self::step(Op::QueryIterable {
            statement: statement.into(),
            next: Box::new(move |rows| {
                let values = rows.iter().map(&mapper).collect::<DslResult<Vec<_>>>()?;
                Ok(Node::pure(values))
            }),
        })
    }
}

impl Program<Result<(), SchemaDrift>> {
    /// Compare `table` with the layout `statement` produces.
    ///
    /// Drift is the program's value, not a failure; backend errors still fail.
    pub fn validate<F>(statement: impl Into<Statement>, table: &Table<F>) -> Self
    where
        F: FieldList + Clone + Send + 'static,
    {
        let table = table.clone();
        Self::query_meta(statement, move |metadata| Ok(table.validate(metadata)))
    }
}
