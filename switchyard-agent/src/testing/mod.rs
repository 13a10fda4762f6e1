// ABOUTME: Test doubles for the native seams of every runtime variant.
// ABOUTME: Used by this crate's tests and by downstream crates exercising the coordinator.

pub mod scripted;

pub use scripted::{
    collect_events, memory_store, ChatStep, ScriptedChatClient, ScriptedGraph, ScriptedThreadClient,
    Step,
};
