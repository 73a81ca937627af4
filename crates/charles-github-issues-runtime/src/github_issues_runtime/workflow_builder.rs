use charles_github_issues::command_classifier::CommandCategory;

use super::authorization_planner::{general_preconditions, Check, CheckKind};
use super::bot_services::BotServices;
use super::side_effects::{reply_and_end, Leaf, LeafKind};
use super::step_engine::{gate, seq, terminal, PlanStep, Steps};

/// Composes per-category plans from gates and leaves.
pub struct WorkflowBuilder<'a> {
    services: &'a BotServices,
}

impl<'a> WorkflowBuilder<'a> {
    pub fn new(services: &'a BotServices) -> Self {
        Self { services }
    }

    pub fn build(&self, category: CommandCategory) -> Steps {
        let root = match category {
            CommandCategory::Hello => reply_and_end(self.services, "hello.comment"),
            CommandCategory::Unknown => reply_and_end(self.services, "unknown.comment"),
            CommandCategory::IndexSite => self.index_plan(LeafKind::IndexSite, category),
            CommandCategory::IndexPage => self.linked_index_plan(LeafKind::IndexPage, category),
            CommandCategory::IndexSitemap => {
                self.linked_index_plan(LeafKind::IndexSitemap, category)
            }
            CommandCategory::DeleteIndex => self.delete_index_plan(),
            CommandCategory::DeletePage => self.delete_page_plan(),
        };
        Steps::new(root, reply_and_end(self.services, "step.failure.comment"))
    }

    fn check(&self, kind: CheckKind) -> Check {
        Check::new(kind, self.services)
    }

    fn leaf(&self, kind: LeafKind) -> Leaf {
        Leaf::new(kind, self.services)
    }

    /// start reply, index, star, finished reply, tweet; a whole-site index
    /// also emails the author.
    fn index_plan(&self, index: LeafKind, category: CommandCategory) -> PlanStep {
        let done = terminal(format!("{} finished", category.as_str()));
        let tail = match index {
            LeafKind::IndexSite => seq(self.leaf(LeafKind::EmailAuthor), done),
            _ => done,
        };
        let work = seq(
            self.leaf(LeafKind::Reply("index.start.comment")),
            seq(
                self.leaf(index),
                seq(
                    self.leaf(LeafKind::StarRepo),
                    seq(
                        self.leaf(LeafKind::Reply("index.finished.comment")),
                        seq(self.leaf(LeafKind::Tweet), tail),
                    ),
                ),
            ),
        );
        general_preconditions(self.services, work)
    }

    fn linked_index_plan(&self, index: LeafKind, category: CommandCategory) -> PlanStep {
        gate(
            self.check(CheckKind::PageHostedOnGithub),
            self.index_plan(index, category),
            reply_and_end(self.services, "denied.badlink.comment"),
        )
    }

    fn delete_index_plan(&self) -> PlanStep {
        let delete = general_preconditions(
            self.services,
            seq(
                self.leaf(LeafKind::DeleteIndex),
                seq(
                    self.leaf(LeafKind::Reply("deleteindex.finished.comment")),
                    seq(
                        self.leaf(LeafKind::Follow),
                        seq(
                            self.leaf(LeafKind::Tweet),
                            terminal("deleteindex finished"),
                        ),
                    ),
                ),
            ),
        );
        gate(
            self.check(CheckKind::DeleteIndexNameMatches),
            gate(
                self.check(CheckKind::IndexExists),
                delete,
                reply_and_end(self.services, "index.missing.comment"),
            ),
            reply_and_end(self.services, "denied.deleteindex.comment"),
        )
    }

    fn delete_page_plan(&self) -> PlanStep {
        let delete = gate(
            self.check(CheckKind::IndexExists),
            seq(
                self.leaf(LeafKind::DeletePage),
                reply_and_end(self.services, "deletepage.finished.comment"),
            ),
            reply_and_end(self.services, "index.missing.comment"),
        );
        gate(
            self.check(CheckKind::PageHostedOnGithub),
            general_preconditions(self.services, delete),
            reply_and_end(self.services, "denied.badlink.comment"),
        )
    }
}
