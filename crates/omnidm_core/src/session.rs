//! Typed repositories bound to one entity type and one backend.

use crate::adapter::{Adapter, RecordCursor};
use crate::descriptor::{describe, Entity, EntityDescriptor};
use crate::error::{OdmError, OdmResult, QueryProblem};
use crate::query::{Query, Update, ValidatedQuery, ValidatedUpdate};
use omnidm_codec::{FieldDescriptor, Record, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-call deadline control.
///
/// Without either setting, a call gets the backend's query timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Absolute deadline; wins over `timeout`.
    pub deadline: Option<Instant>,
    /// Deadline relative to the start of the call.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    /// Options with an absolute deadline.
    pub fn deadline(at: Instant) -> Self {
        Self {
            deadline: Some(at),
            timeout: None,
        }
    }

    /// Options with a relative timeout.
    pub fn timeout(after: Duration) -> Self {
        Self {
            deadline: None,
            timeout: Some(after),
        }
    }

    fn resolve(&self, default_timeout: Duration) -> Instant {
        self.deadline
            .unwrap_or_else(|| Instant::now() + self.timeout.unwrap_or(default_timeout))
    }
}

/// How `save` writes a record that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveMode {
    /// Overwrite every field.
    #[default]
    Replace,
    /// Read the stored record and write only the fields that differ.
    Partial,
}

/// What `save` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// No record had the key; one was inserted.
    Inserted,
    /// The stored record was overwritten or patched.
    Updated,
    /// Partial mode found nothing to change.
    Unchanged,
}

/// CRUD and queries for entity `T` on one backend.
///
/// A session holds only the entity's descriptor and a shared adapter; it
/// keeps no state between calls and is cheap to clone and share across
/// threads.
///
/// # Example
///
/// ```rust
/// use omnidm_core::query::{gt, Query};
/// use omnidm_core::{BackendConfig, ConnectionRegistry, DescriptorBuilder, Entity};
/// use omnidm_codec::{CodecResult, FieldDescriptor, Record};
///
/// struct Note {
///     id: i64,
///     stars: i64,
/// }
///
/// impl Entity for Note {
///     fn define(builder: DescriptorBuilder) -> DescriptorBuilder {
///         builder
///             .field(FieldDescriptor::integer("id").primary_key())
///             .field(FieldDescriptor::integer("stars"))
///     }
///     fn to_record(&self) -> Record {
///         Record::new().with("id", self.id).with("stars", self.stars)
///     }
///     fn from_record(r: Record) -> CodecResult<Self> {
///         Ok(Self { id: r.field("id")?, stars: r.field("stars")? })
///     }
/// }
///
/// let registry = ConnectionRegistry::new();
/// registry.open("main", BackendConfig::sqlite_memory()).unwrap();
/// let notes = registry.session::<Note>("main").unwrap();
///
/// notes.save(Note { id: 1, stars: 5 }).unwrap();
/// notes.save(Note { id: 2, stars: 1 }).unwrap();
/// let starred: Vec<Note> = notes
///     .find(Query::matching(gt("stars", 3)))
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(starred.len(), 1);
/// ```
pub struct Session<T> {
    descriptor: Arc<EntityDescriptor>,
    adapter: Arc<dyn Adapter>,
    query_timeout: Duration,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            adapter: Arc::clone(&self.adapter),
            query_timeout: self.query_timeout,
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("entity", &self.descriptor.entity())
            .field("backend", &self.adapter.backend())
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

fn unshaped(query: &Query, operation: &str) -> OdmResult<()> {
    if query.is_shaped() {
        return Err(OdmError::invalid_query(
            QueryProblem::new("*", "projection, sort and pagination do not apply").with_operator(operation),
        ));
    }
    Ok(())
}

impl<T: Entity> Session<T> {
    /// Binds `T` to an adapter.
    ///
    /// # Errors
    ///
    /// Returns an invalid entity definition error if `T`'s declaration is
    /// unusable.
    pub fn new(adapter: Arc<dyn Adapter>, query_timeout: Duration) -> OdmResult<Self> {
        Ok(Self {
            descriptor: describe::<T>()?,
            adapter,
            query_timeout,
            _entity: PhantomData,
        })
    }

    /// The entity's descriptor.
    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    /// The backend name.
    pub fn backend(&self) -> &str {
        self.adapter.backend()
    }

    fn deadline(&self, options: &CallOptions) -> Option<Instant> {
        Some(options.resolve(self.query_timeout))
    }

    fn typed(&self, query: &Query) -> OdmResult<ValidatedQuery> {
        if query.projection().is_some() {
            return Err(OdmError::invalid_query(
                QueryProblem::new("*", "typed reads return whole entities; use project").with_operator("select"),
            ));
        }
        query.validate(&self.descriptor)
    }

    /// Streams every entity the query selects.
    ///
    /// # Errors
    ///
    /// See [`Session::find_with`].
    pub fn find(&self, query: impl Into<Query>) -> OdmResult<EntityCursor<T>> {
        self.find_with(query, &CallOptions::default())
    }

    /// Streams every entity the query selects.
    ///
    /// Entities are decoded as the cursor is consumed; a record that does
    /// not decode ends the stream with an error.
    ///
    /// # Errors
    ///
    /// Returns an invalid query error before touching the backend, or the
    /// backend's error if the query cannot be started.
    pub fn find_with(&self, query: impl Into<Query>, options: &CallOptions) -> OdmResult<EntityCursor<T>> {
        let query = self.typed(&query.into())?;
        let records = self.adapter.find(&query, self.deadline(options))?;
        Ok(EntityCursor::new(records))
    }

    /// The first entity the query selects, if any.
    ///
    /// # Errors
    ///
    /// See [`Session::find_with`].
    pub fn find_one(&self, query: impl Into<Query>) -> OdmResult<Option<T>> {
        self.find_one_with(query, &CallOptions::default())
    }

    /// The first entity the query selects, if any.
    ///
    /// # Errors
    ///
    /// See [`Session::find_with`].
    pub fn find_one_with(&self, query: impl Into<Query>, options: &CallOptions) -> OdmResult<Option<T>> {
        let query = self.typed(&query.into())?.capped(1);
        let mut records = EntityCursor::<T>::new(self.adapter.find(&query, self.deadline(options))?);
        records.next().transpose()
    }

    /// The entity with primary key `key`, if stored.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if `key` is not of the key's type.
    pub fn find_by_id(&self, key: impl Into<Value>) -> OdmResult<Option<T>> {
        self.find_by_id_with(key, &CallOptions::default())
    }

    /// The entity with primary key `key`, if stored.
    ///
    /// # Errors
    ///
    /// See [`Session::find_by_id`].
    pub fn find_by_id_with(&self, key: impl Into<Value>, options: &CallOptions) -> OdmResult<Option<T>> {
        let query = ValidatedQuery::by_key(&self.descriptor, key.into())?.capped(1);
        let mut records = EntityCursor::<T>::new(self.adapter.find(&query, self.deadline(options))?);
        records.next().transpose()
    }

    /// Streams projected records holding only the selected fields.
    ///
    /// # Errors
    ///
    /// See [`Session::project_with`].
    pub fn project(&self, query: Query) -> OdmResult<RecordCursor> {
        self.project_with(query, &CallOptions::default())
    }

    /// Streams projected records holding only the selected fields.
    ///
    /// # Errors
    ///
    /// Returns an invalid query error if the query has no projection or
    /// does not validate.
    pub fn project_with(&self, query: Query, options: &CallOptions) -> OdmResult<RecordCursor> {
        if query.projection().is_none() {
            return Err(OdmError::invalid_query(
                QueryProblem::new("*", "no fields selected").with_operator("select"),
            ));
        }
        let query = query.validate(&self.descriptor)?;
        self.adapter.find(&query, self.deadline(options))
    }

    /// Counts the entities the query's filter matches.
    ///
    /// # Errors
    ///
    /// See [`Session::count_with`].
    pub fn count(&self, query: impl Into<Query>) -> OdmResult<u64> {
        self.count_with(query, &CallOptions::default())
    }

    /// Counts the entities the query's filter matches.
    ///
    /// # Errors
    ///
    /// Returns an invalid query error if the query carries a projection,
    /// sort or pagination.
    pub fn count_with(&self, query: impl Into<Query>, options: &CallOptions) -> OdmResult<u64> {
        let query = query.into();
        unshaped(&query, "count")?;
        let query = query.validate(&self.descriptor)?;
        self.adapter.count(&query, self.deadline(options))
    }

    /// Whether any entity matches the query.
    ///
    /// # Errors
    ///
    /// See [`Session::find_with`].
    pub fn exists(&self, query: impl Into<Query>) -> OdmResult<bool> {
        self.exists_with(query, &CallOptions::default())
    }

    /// Whether any entity matches the query.
    ///
    /// # Errors
    ///
    /// See [`Session::find_with`].
    pub fn exists_with(&self, query: impl Into<Query>, options: &CallOptions) -> OdmResult<bool> {
        let query = self.typed(&query.into())?.capped(1);
        let mut records = self.adapter.find(&query, self.deadline(options))?;
        records.next().transpose().map(|r| r.is_some())
    }

    /// Inserts `entity` if its key is new, otherwise overwrites the stored
    /// record. Returns the entity.
    ///
    /// # Errors
    ///
    /// See [`Session::save_with`].
    pub fn save(&self, entity: T) -> OdmResult<T> {
        self.save_with(entity, SaveMode::Replace, &CallOptions::default())
            .map(|(entity, _)| entity)
    }

    /// Saves `entity` in the given mode.
    ///
    /// # Errors
    ///
    /// See [`Session::save_with`].
    pub fn save_with_mode(&self, entity: T, mode: SaveMode) -> OdmResult<(T, SaveOutcome)> {
        self.save_with(entity, mode, &CallOptions::default())
    }

    /// Saves `entity`: an existence check on its primary key decides
    /// between insert and update.
    ///
    /// If another caller inserts the same key between the check and the
    /// insert, the insert's constraint violation turns into an update.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error, before anything is written, if
    /// the entity does not fit its declaration.
    pub fn save_with(&self, entity: T, mode: SaveMode, options: &CallOptions) -> OdmResult<(T, SaveOutcome)> {
        let deadline = self.deadline(options);
        let record = entity.to_record();
        self.descriptor.check(&record)?;
        let key = self.descriptor.key_of(&record)?;

        let outcome = match mode {
            SaveMode::Replace => {
                if self.adapter.contains_key(&self.descriptor, &key, deadline)? {
                    self.adapter.replace(&self.descriptor, &record, deadline)?;
                    SaveOutcome::Updated
                } else {
                    self.insert_or_replace(&record, deadline)?
                }
            }
            SaveMode::Partial => {
                let stored = ValidatedQuery::by_key(&self.descriptor, key.clone())?.capped(1);
                // The cursor must be gone before the write below needs a connection.
                let current = self.adapter.find(&stored, deadline)?.next().transpose()?;
                match current {
                    Some(current) => {
                        let changed: Vec<&FieldDescriptor> = self
                            .descriptor
                            .fields()
                            .iter()
                            .filter(|f| current.get_or_null(f.name()) != record.get_or_null(f.name()))
                            .collect();
                        if changed.is_empty() {
                            SaveOutcome::Unchanged
                        } else {
                            self.adapter
                                .update_fields(&self.descriptor, &key, &record, &changed, deadline)?;
                            SaveOutcome::Updated
                        }
                    }
                    None => self.insert_or_replace(&record, deadline)?,
                }
            }
        };
        Ok((entity, outcome))
    }

    fn insert_or_replace(&self, record: &Record, deadline: Option<Instant>) -> OdmResult<SaveOutcome> {
        match self.adapter.insert(&self.descriptor, std::slice::from_ref(record), deadline) {
            Ok(_) => Ok(SaveOutcome::Inserted),
            Err(OdmError::ConstraintViolation { .. })
                if self.adapter.contains_key(&self.descriptor, &self.descriptor.key_of(record)?, deadline)? =>
            {
                self.adapter.replace(&self.descriptor, record, deadline)?;
                Ok(SaveOutcome::Updated)
            }
            Err(e) => Err(e),
        }
    }

    /// Inserts `entity`; fails if its key is taken.
    ///
    /// # Errors
    ///
    /// See [`Session::insert_with`].
    pub fn insert(&self, entity: &T) -> OdmResult<()> {
        self.insert_with(entity, &CallOptions::default())
    }

    /// Inserts `entity`; fails if its key is taken.
    ///
    /// # Errors
    ///
    /// Returns a constraint violation if the key exists, or a value
    /// conversion error if the entity does not fit its declaration.
    pub fn insert_with(&self, entity: &T, options: &CallOptions) -> OdmResult<()> {
        self.adapter
            .insert(&self.descriptor, &[entity.to_record()], self.deadline(options))?;
        Ok(())
    }

    /// Inserts several entities, batched where the backend allows.
    ///
    /// # Errors
    ///
    /// See [`Session::insert_many_with`].
    pub fn insert_many(&self, entities: &[T]) -> OdmResult<u64> {
        self.insert_many_with(entities, &CallOptions::default())
    }

    /// Inserts several entities, batched where the backend allows.
    ///
    /// Every entity is checked before anything is written.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error for the first invalid entity, or
    /// a constraint violation for a taken key.
    pub fn insert_many_with(&self, entities: &[T], options: &CallOptions) -> OdmResult<u64> {
        let records: Vec<Record> = entities.iter().map(Entity::to_record).collect();
        self.adapter.insert(&self.descriptor, &records, self.deadline(options))
    }

    /// Applies `update` to every entity the query matches.
    ///
    /// # Errors
    ///
    /// See [`Session::update_many_with`].
    pub fn update_many(&self, query: impl Into<Query>, update: &Update) -> OdmResult<u64> {
        self.update_many_with(query, update, &CallOptions::default())
    }

    /// Applies `update` to every entity the query matches; returns the
    /// number matched.
    ///
    /// # Errors
    ///
    /// Returns an invalid query error if the query is shaped or either the
    /// query or the update does not validate.
    pub fn update_many_with(&self, query: impl Into<Query>, update: &Update, options: &CallOptions) -> OdmResult<u64> {
        let (query, update) = self.validate_update(query.into(), update, "update_many")?;
        self.adapter.update_where(&query, &update, self.deadline(options))
    }

    /// Applies `update` to one entity the query matches; returns whether
    /// one matched.
    ///
    /// # Errors
    ///
    /// See [`Session::update_one_with`].
    pub fn update_one(&self, query: impl Into<Query>, update: &Update) -> OdmResult<bool> {
        self.update_one_with(query, update, &CallOptions::default())
    }

    /// Applies `update` to one entity the query matches; returns whether
    /// one matched.
    ///
    /// Relational backends pick the match with the lowest primary key,
    /// document backends their first match in natural order.
    ///
    /// # Errors
    ///
    /// See [`Session::update_many_with`].
    pub fn update_one_with(&self, query: impl Into<Query>, update: &Update, options: &CallOptions) -> OdmResult<bool> {
        let (query, update) = self.validate_update(query.into(), update, "update_one")?;
        Ok(self.adapter.update_one(&query, &update, self.deadline(options))? > 0)
    }

    /// Applies `update` to the entity with primary key `key`; returns
    /// whether it exists.
    ///
    /// # Errors
    ///
    /// See [`Session::update_by_id_with`].
    pub fn update_by_id(&self, key: impl Into<Value>, update: &Update) -> OdmResult<bool> {
        self.update_by_id_with(key, update, &CallOptions::default())
    }

    /// Applies `update` to the entity with primary key `key`; returns
    /// whether it exists.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if `key` is not of the key's type,
    /// or an invalid query error if the update does not validate.
    pub fn update_by_id_with(&self, key: impl Into<Value>, update: &Update, options: &CallOptions) -> OdmResult<bool> {
        let query = ValidatedQuery::by_key(&self.descriptor, key.into())?;
        let update = update.validate(&self.descriptor)?;
        Ok(self.adapter.update_where(&query, &update, self.deadline(options))? > 0)
    }

    /// Validates a filter and an update together, reporting the problems
    /// of both at once.
    fn validate_update(
        &self,
        query: Query,
        update: &Update,
        operation: &str,
    ) -> OdmResult<(ValidatedQuery, ValidatedUpdate)> {
        unshaped(&query, operation)?;
        match (query.validate(&self.descriptor), update.validate(&self.descriptor)) {
            (Ok(q), Ok(u)) => Ok((q, u)),
            (Err(OdmError::InvalidQuery { mut problems }), Err(OdmError::InvalidQuery { problems: more })) => {
                problems.extend(more);
                Err(OdmError::InvalidQuery { problems })
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    /// Deletes every entity the query matches; returns how many.
    ///
    /// # Errors
    ///
    /// See [`Session::delete_with`].
    pub fn delete(&self, query: impl Into<Query>) -> OdmResult<u64> {
        self.delete_with(query, &CallOptions::default())
    }

    /// Deletes every entity the query matches; returns how many.
    ///
    /// # Errors
    ///
    /// Returns an invalid query error if the query is shaped or does not
    /// validate.
    pub fn delete_with(&self, query: impl Into<Query>, options: &CallOptions) -> OdmResult<u64> {
        let query = query.into();
        unshaped(&query, "delete")?;
        let query = query.validate(&self.descriptor)?;
        self.adapter.delete(&query, self.deadline(options))
    }

    /// Deletes one entity the query matches; returns whether one matched.
    ///
    /// # Errors
    ///
    /// See [`Session::delete_one_with`].
    pub fn delete_one(&self, query: impl Into<Query>) -> OdmResult<bool> {
        self.delete_one_with(query, &CallOptions::default())
    }

    /// Deletes one entity the query matches; returns whether one matched.
    ///
    /// The entity chosen follows the same rule as
    /// [`Session::update_one_with`].
    ///
    /// # Errors
    ///
    /// See [`Session::delete_with`].
    pub fn delete_one_with(&self, query: impl Into<Query>, options: &CallOptions) -> OdmResult<bool> {
        let query = query.into();
        unshaped(&query, "delete_one")?;
        let query = query.validate(&self.descriptor)?;
        Ok(self.adapter.delete_one(&query, self.deadline(options))? > 0)
    }

    /// Deletes the entity with primary key `key`; returns whether one
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns a value conversion error if `key` is not of the key's type.
    pub fn delete_by_id(&self, key: impl Into<Value>) -> OdmResult<bool> {
        let query = ValidatedQuery::by_key(&self.descriptor, key.into())?;
        let deadline = self.deadline(&CallOptions::default());
        Ok(self.adapter.delete(&query, deadline)? > 0)
    }

    /// Creates the entity's table if the backend needs one.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the DDL fails.
    pub fn ensure_schema(&self) -> OdmResult<()> {
        let deadline = self.deadline(&CallOptions::default());
        self.adapter.ensure_schema(&self.descriptor, deadline)
    }
}

/// A lazy, forward-only stream of entities.
///
/// Dropping the cursor releases the underlying native cursor. After an
/// error it yields nothing more.
pub struct EntityCursor<T> {
    records: RecordCursor,
    failed: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T> EntityCursor<T> {
    fn new(records: RecordCursor) -> Self {
        Self {
            records,
            failed: false,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Iterator for EntityCursor<T> {
    type Item = OdmResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self
            .records
            .next()?
            .and_then(|record| T::from_record(record).map_err(OdmError::from));
        self.failed = item.is_err();
        Some(item)
    }
}

impl<T> fmt::Debug for EntityCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCursor")
            .field("records", &self.records)
            .field("failed", &self.failed)
            .finish()
    }
}
