mod catalog;
mod helpers;
mod inventory;
mod recipe;
mod shopping;

pub(crate) use catalog::{cmd_catalog_add, cmd_catalog_list};
pub(crate) use inventory::{
    cmd_inventory_list, cmd_inventory_mark, cmd_inventory_reconcile, cmd_inventory_remove,
};
pub(crate) use recipe::{cmd_recipe_add, cmd_recipe_list, cmd_recipe_show};
pub(crate) use shopping::{
    cmd_shopping_build, cmd_shopping_check, cmd_shopping_list_all, cmd_shopping_show,
};
