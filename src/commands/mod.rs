// Plan, apply and inspect stacks
pub mod stack;

// Scaffolding
pub mod template;
