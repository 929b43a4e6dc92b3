//! Listener Pipeline - Sequential save/remove hook dispatch
//!
//! Save and remove operations trigger registered listeners strictly in
//! registration order; the first error aborts the remaining listeners and
//! propagates. Cascade ordering stays deterministic because nothing runs
//! concurrently.

use async_trait::async_trait;

use crate::context::DataContext;
use crate::error::OrmResult;
use crate::schema::ModelDef;
use crate::store::Record;

/// Hooks invoked around save and remove operations
#[async_trait]
pub trait DataListener: Send + Sync {
    async fn before_save(
        &self,
        _context: &DataContext,
        _model: &ModelDef,
        _object: &mut Record,
    ) -> OrmResult<()> {
        Ok(())
    }

    async fn after_save(
        &self,
        _context: &DataContext,
        _model: &ModelDef,
        _object: &mut Record,
    ) -> OrmResult<()> {
        Ok(())
    }

    async fn before_remove(
        &self,
        _context: &DataContext,
        _model: &ModelDef,
        _object: &Record,
    ) -> OrmResult<()> {
        Ok(())
    }

    async fn after_remove(
        &self,
        _context: &DataContext,
        _model: &ModelDef,
        _object: &Record,
    ) -> OrmResult<()> {
        Ok(())
    }
}

/// Ordered collection of listeners triggered by the context
#[derive(Default)]
pub struct ListenerPipeline {
    listeners: Vec<Box<dyn DataListener>>,
}

impl ListenerPipeline {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn register(&mut self, listener: Box<dyn DataListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub async fn trigger_before_save(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &mut Record,
    ) -> OrmResult<()> {
        for listener in &self.listeners {
            listener.before_save(context, model, object).await?;
        }
        Ok(())
    }

    pub async fn trigger_after_save(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &mut Record,
    ) -> OrmResult<()> {
        for listener in &self.listeners {
            listener.after_save(context, model, object).await?;
        }
        Ok(())
    }

    pub async fn trigger_before_remove(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
    ) -> OrmResult<()> {
        for listener in &self.listeners {
            listener.before_remove(context, model, object).await?;
        }
        Ok(())
    }

    pub async fn trigger_after_remove(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
    ) -> OrmResult<()> {
        for listener in &self.listeners {
            listener.after_remove(context, model, object).await?;
        }
        Ok(())
    }
}
