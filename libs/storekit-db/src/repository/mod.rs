//! Generic repository over one `SeaORM` entity.
//!
//! Reads run immediately on the unit of work's runner (its open transaction,
//! or the pooled connection). Writes are compiled to statements and staged in
//! the unit of work until `save_changes`/`commit`.

pub mod procedure;
pub mod raw;

use std::sync::Arc;

use sea_orm::sea_query::{IntoCondition, Order};
use sea_orm::{
    ActiveModelTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    Iterable, PaginatorTrait, PrimaryKeyTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait,
    Select, Statement,
};

use crate::paging::{Page, PageRequest, paginate};
use crate::query::{
    FieldMap, FilterExt, SearchRequest, SearchRequestValidator, Searchable, SortExt,
};
use crate::uow::{ChangeKind, UnitOfWork};
use crate::{DbError, Result};

/// Hook applied to the base query, e.g. to join related entities.
pub type IncludeFn<E> = Box<dyn Fn(Select<E>) -> Select<E> + Send + Sync>;

/// Options for a list read: filter, ordering, include hook and page.
///
/// Filtering and ordering are applied before the page is cut, so the
/// filtered count covers every matching row.
#[must_use]
pub struct ListQuery<E: EntityTrait> {
    pub filter: Option<Condition>,
    pub order_by: Vec<(E::Column, Order)>,
    pub include: Option<IncludeFn<E>>,
    pub page: Option<PageRequest>,
}

impl<E: EntityTrait> Default for ListQuery<E> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: Vec::new(),
            include: None,
            page: None,
        }
    }
}

impl<E: EntityTrait> ListQuery<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// AND `cond` into the filter.
    pub fn filter(mut self, cond: impl IntoCondition) -> Self {
        let cond = cond.into_condition();
        self.filter = Some(match self.filter.take() {
            Some(prev) => Condition::all().add(prev).add(cond),
            None => cond,
        });
        self
    }

    pub fn order_by(mut self, col: E::Column, order: Order) -> Self {
        self.order_by.push((col, order));
        self
    }

    pub fn include(mut self, hook: impl Fn(Select<E>) -> Select<E> + Send + Sync + 'static) -> Self {
        self.include = Some(Box::new(hook));
        self
    }

    pub fn page(mut self, index: u64, size: u64) -> Self {
        let from = self.page.map_or(1, |p| p.from);
        self.page = Some(PageRequest::new(index, size).with_origin(from));
        self
    }

    /// First page index; 1 unless set.
    pub fn origin(mut self, from: u64) -> Self {
        self.page = Some(self.page.unwrap_or_default().with_origin(from));
        self
    }

    fn apply(self, select: Select<E>) -> Select<E> {
        let mut select = match &self.include {
            Some(hook) => hook(select),
            None => select,
        };
        if let Some(cond) = self.filter {
            select = select.filter(cond);
        }
        for (col, order) in self.order_by {
            select = select.order_by(col, order);
        }
        select
    }
}

/// CRUD, search and paging for entity `E`, bound to one [`UnitOfWork`].
pub struct Repository<'a, E: EntityTrait> {
    uow: &'a UnitOfWork,
    fields: Arc<FieldMap<E>>,
}

impl<E: EntityTrait> std::fmt::Debug for Repository<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &E::default().table_name())
            .field("fields", &self.fields.len())
            .finish_non_exhaustive()
    }
}

impl<'a, E: Searchable> Repository<'a, E> {
    pub(crate) const fn new(uow: &'a UnitOfWork, fields: Arc<FieldMap<E>>) -> Self {
        Self { uow, fields }
    }

    #[must_use]
    pub const fn unit_of_work(&self) -> &'a UnitOfWork {
        self.uow
    }

    #[must_use]
    pub const fn fields(&self) -> &Arc<FieldMap<E>> {
        &self.fields
    }

    /// Validator sharing this repository's field map.
    #[must_use]
    pub fn validator(&self) -> SearchRequestValidator<E> {
        SearchRequestValidator::new(Arc::clone(&self.fields))
    }

    /// The bare `SELECT` for callers composing their own queries.
    #[must_use]
    pub fn queryable() -> Select<E> {
        E::find()
    }
}

impl<E> Repository<'_, E>
where
    E: Searchable,
    E::Model: Sync,
{
    // ---- reads -----------------------------------------------------------

    /// One page of rows matching `query`; `total` is the unfiltered row count.
    ///
    /// # Errors
    /// `DbError::Page` for invalid page parameters, before any query runs;
    /// `DbError::Sea` on query failure.
    pub async fn get_paged(&self, query: ListQuery<E>) -> Result<Page<E::Model>> {
        let page = query.page.unwrap_or_default();
        page.validate()?;
        let runner = self.uow.runner()?;
        let total = E::find().count(&runner).await?;
        paginate(query.apply(E::find()), &runner, page, total).await
    }

    /// [`Repository::get_paged`] with `converter` applied to the page's rows only.
    ///
    /// # Errors
    /// Same as [`Repository::get_paged`].
    pub async fn get_paged_as<R>(
        &self,
        query: ListQuery<E>,
        converter: impl FnOnce(Vec<E::Model>) -> Vec<R>,
    ) -> Result<Page<R>> {
        Ok(self.get_paged(query).await?.map(converter))
    }

    /// Run a [`SearchRequest`]; clauses that do not compile are skipped.
    ///
    /// # Errors
    /// `DbError::Page` for invalid page parameters, `DbError::Sea` on query failure.
    pub async fn search(&self, req: &SearchRequest) -> Result<Page<E::Model>> {
        let page = PageRequest::new(req.page_index, req.page_size);
        page.validate()?;
        let runner = self.uow.runner()?;
        let select = E::find()
            .apply_filters(&req.filters, &self.fields, runner.get_database_backend())
            .apply_sorts(&req.sorts, &self.fields);
        let total = E::find().count(&runner).await?;
        paginate(select, &runner, page, total).await
    }

    /// Run a [`SearchRequest`] only if every part of it is valid.
    ///
    /// # Errors
    /// `DbError::Validation` listing every offending property; no query runs.
    pub async fn search_strict(&self, req: &SearchRequest) -> Result<Page<E::Model>> {
        self.validator().validate(req)?;
        let page = PageRequest::new(req.page_index, req.page_size);
        let runner = self.uow.runner()?;
        let select = E::find()
            .try_apply_filters(&req.filters, &self.fields, runner.get_database_backend())?
            .try_apply_sorts(&req.sorts, &self.fields)?;
        let total = E::find().count(&runner).await?;
        paginate(select, &runner, page, total).await
    }

    /// [`Repository::search`] with `converter` applied to the page's rows only.
    ///
    /// # Errors
    /// Same as [`Repository::search`].
    pub async fn search_as<R>(
        &self,
        req: &SearchRequest,
        converter: impl FnOnce(Vec<E::Model>) -> Vec<R>,
    ) -> Result<Page<R>> {
        Ok(self.search(req).await?.map(converter))
    }

    /// Every row matching `query`; its page, when set, limits the result.
    ///
    /// # Errors
    /// `DbError::Page` for an invalid page, `DbError::Sea` on query failure.
    pub async fn get(&self, query: ListQuery<E>) -> Result<Vec<E::Model>> {
        let page = query.page;
        let mut select = query.apply(E::find());
        if let Some(page) = page {
            page.validate()?;
            select = select.offset(page.offset()).limit(page.size);
        }
        Ok(select.all(&self.uow.runner()?).await?)
    }

    /// The only row matching `filter`, or `None`.
    ///
    /// # Errors
    /// `DbError::MultipleRows` when more than one row matches.
    pub async fn single_or_default(&self, filter: impl IntoCondition) -> Result<Option<E::Model>> {
        let mut rows = E::find()
            .filter(filter.into_condition())
            .limit(2)
            .all(&self.uow.runner()?)
            .await?;
        if rows.len() > 1 {
            return Err(DbError::MultipleRows(E::default().table_name().to_owned()));
        }
        Ok(rows.pop())
    }

    /// Row by primary key.
    ///
    /// # Errors
    /// `DbError::Sea` on query failure.
    pub async fn find<K>(&self, key: K) -> Result<Option<E::Model>>
    where
        K: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        Ok(E::find_by_id(key).one(&self.uow.runner()?).await?)
    }

    /// First row matching `filter`.
    ///
    /// # Errors
    /// `DbError::Sea` on query failure.
    pub async fn find_by(&self, filter: impl IntoCondition) -> Result<Option<E::Model>> {
        Ok(E::find()
            .filter(filter.into_condition())
            .one(&self.uow.runner()?)
            .await?)
    }

    /// # Errors
    /// `DbError::Sea` on query failure.
    pub async fn count(&self, filter: Option<Condition>) -> Result<u64> {
        let select = match filter {
            Some(cond) => E::find().filter(cond),
            None => E::find(),
        };
        Ok(select.count(&self.uow.runner()?).await?)
    }

    /// # Errors
    /// `DbError::Sea` on query failure.
    pub async fn exists(&self, filter: Option<Condition>) -> Result<bool> {
        let select = match filter {
            Some(cond) => E::find().filter(cond),
            None => E::find(),
        };
        Ok(select.one(&self.uow.runner()?).await?.is_some())
    }
}

impl<E> Repository<'_, E>
where
    E: Searchable,
    E::Model: Sync + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
{
    // ---- staged writes ---------------------------------------------------

    fn stage(&self, kind: ChangeKind, stmt: Statement) -> Result<()> {
        self.uow.stage(E::default().table_name(), kind, stmt)
    }

    /// # Errors
    /// `DbError::Disposed` after the unit of work was disposed.
    pub fn insert(&self, model: E::Model) -> Result<()> {
        let backend = self.uow.backend()?;
        self.stage(
            ChangeKind::Insert,
            E::insert(model.into_active_model()).build(backend),
        )
    }

    /// Stage one multi-row `INSERT`; an empty batch stages nothing.
    ///
    /// # Errors
    /// `DbError::Disposed` after the unit of work was disposed.
    pub fn insert_many(&self, models: impl IntoIterator<Item = E::Model>) -> Result<()> {
        let backend = self.uow.backend()?;
        let models: Vec<E::ActiveModel> = models
            .into_iter()
            .map(IntoActiveModel::into_active_model)
            .collect();
        if models.is_empty() {
            return Ok(());
        }
        self.stage(ChangeKind::Insert, E::insert_many(models).build(backend))
    }

    /// Overwrite every non-key column of the row with `model`'s key.
    ///
    /// The model does not need to be loaded first.
    ///
    /// # Errors
    /// `DbError::Disposed` after the unit of work was disposed.
    pub fn update(&self, model: E::Model) -> Result<()> {
        let backend = self.uow.backend()?;
        self.stage(ChangeKind::Update, E::update(modified::<E>(model)).build(backend))
    }

    /// # Errors
    /// `DbError::Disposed` after the unit of work was disposed.
    pub fn update_many(&self, models: impl IntoIterator<Item = E::Model>) -> Result<()> {
        models.into_iter().try_for_each(|m| self.update(m))
    }

    /// Delete the row with `model`'s key.
    ///
    /// # Errors
    /// `DbError::Disposed` after the unit of work was disposed.
    pub fn delete(&self, model: E::Model) -> Result<()> {
        let backend = self.uow.backend()?;
        self.stage(
            ChangeKind::Delete,
            E::delete(model.into_active_model()).build(backend),
        )
    }

    /// # Errors
    /// `DbError::Disposed` after the unit of work was disposed.
    pub fn delete_many(&self, models: impl IntoIterator<Item = E::Model>) -> Result<()> {
        models.into_iter().try_for_each(|m| self.delete(m))
    }

    /// # Errors
    /// `DbError::Disposed` after the unit of work was disposed.
    pub fn delete_by_id<K>(&self, key: K) -> Result<()>
    where
        K: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        let backend = self.uow.backend()?;
        self.stage(ChangeKind::Delete, E::delete_by_id(key).build(backend))
    }

    /// # Errors
    /// `DbError::Disposed` after the unit of work was disposed.
    pub fn delete_where(&self, filter: impl IntoCondition) -> Result<()> {
        let backend = self.uow.backend()?;
        self.stage(
            ChangeKind::Delete,
            E::delete_many().filter(filter.into_condition()).build(backend),
        )
    }

    /// # Errors
    /// `DbError::Disposed` after the unit of work was disposed.
    pub fn delete_all(&self) -> Result<()> {
        let backend = self.uow.backend()?;
        self.stage(ChangeKind::Delete, E::delete_many().build(backend))
    }
}

// Mark every column as changed so the UPDATE writes the whole row.
fn modified<E>(model: E::Model) -> E::ActiveModel
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
{
    let mut am = model.into_active_model();
    for col in E::Column::iter() {
        if let Some(value) = am.get(col).into_value() {
            am.set(col, value);
        }
    }
    am
}
