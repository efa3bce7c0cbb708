#![doc = r"Virtual node patch engine, keyed list diff and async component runtime for Patchwork."]

pub mod app;
pub mod async_component;
pub mod collections;
pub mod component;
pub mod config;
pub mod host;
pub mod instance;
pub mod keyed_diff;
mod modules;
pub mod patch;
pub mod platform;
pub mod render;
pub mod runtime;
pub mod timer;
pub mod vnode;

/// Identifier of a realized node owned by a [`Host`].
pub type NodeId = usize;

pub use app::App;
pub use async_component::{
    resolve_async_component, AsyncFactory, AsyncOptions, AsyncState, LoadError, LoadedComponent,
    LoaderOutput, Settle,
};
pub use component::{
    ComponentClass, ComponentDefinition, ComponentDescriptor, ComponentEntry, LifecycleHooks,
    RemovalPassFn, RenderFn, ResolvedOptions,
};
pub use config::{Config, MeasureHandler, WarnHandler};
pub use host::{Event, Handler, Host, HostError, HostStats, Invoker, MemoryHost};
pub use instance::{
    HookFn, HookHandle, Instance, InstanceId, InstanceInit, InstanceState, LifecycleHook,
    Listeners, Props, WeakInstance,
};
pub use keyed_diff::{plan, Anchor, DiffStats, KeyedDiff, ListOp, ListPatcher};
pub use patch::Patcher;
pub use platform::{Clock, RuntimeScheduler};
pub use render::RenderContext;
pub use runtime::{DefaultScheduler, LocalBoxFuture, Runtime, RuntimeHandle};
pub use timer::{TimerRegistration, Timers};
pub use vnode::{
    same_vnode, AsyncMeta, Leave, NodeHook, TransitionHooks, VKey, VNode, VNodeComponentOptions,
    VNodeData, VNodeHooks,
};

#[cfg(test)]
pub use runtime::TestScheduler;
