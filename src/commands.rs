//! Command line surface.

use clap::{Args, Parser, Subcommand};
use orderdesk::gateway::RECENT_ORDERS_LIMIT;
use orderdesk::model::{CreateOrder, OrderFilter, OrderStatus, Role, TaskId, TaskStatus};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "orderdesk")]
#[command(about = "Orders, tasks and users of the order desk, from the terminal")]
#[command(version)]
pub struct Cli {
  /// Path to config file (default: $XDG_CONFIG_HOME/orderdesk/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Browse and edit orders
  #[command(visible_alias = "o")]
  Orders {
    #[command(subcommand)]
    command: OrdersCommand,
  },
  /// Tasks of an order
  #[command(visible_alias = "t")]
  Tasks {
    #[command(subcommand)]
    command: TasksCommand,
  },
  /// User profiles and roles
  #[command(visible_alias = "u")]
  Users {
    #[command(subcommand)]
    command: UsersCommand,
  },
  /// Weekly chart data
  Chart,
}

#[derive(Subcommand, Debug)]
pub enum OrdersCommand {
  /// List orders, newest first
  #[command(visible_alias = "ls")]
  List(OrderFilterArgs),
  Show { id: String },
  /// Orders with the nearest deadlines
  Recent {
    #[arg(short, long, default_value_t = RECENT_ORDERS_LIMIT)]
    limit: usize,
  },
  Stats,
  Create(CreateOrderArgs),
  SetStatus { id: String, status: OrderStatus },
  #[command(visible_alias = "rm")]
  Delete { id: String },
  /// Keep a list on screen, refreshing it periodically
  Watch {
    #[command(flatten)]
    filter: OrderFilterArgs,
    /// Seconds between refreshes
    #[arg(short, long, default_value_t = 30)]
    interval: u64,
  },
}

#[derive(Args, Debug, Clone, Default)]
pub struct OrderFilterArgs {
  #[arg(short, long)]
  pub status: Option<OrderStatus>,
  /// Match client name, project type or order id
  #[arg(short = 'q', long)]
  pub search: Option<String>,
}

impl From<OrderFilterArgs> for OrderFilter {
  fn from(args: OrderFilterArgs) -> Self {
    OrderFilter {
      status: args.status,
      search: args.search,
    }
  }
}

#[derive(Args, Debug, Clone)]
pub struct CreateOrderArgs {
  #[arg(long)]
  pub client: String,
  #[arg(long)]
  pub email: String,
  #[arg(long)]
  pub project_type: String,
  #[arg(long)]
  pub deadline: String,
  #[arg(long)]
  pub amount: f64,
  #[arg(long)]
  pub description: String,
  #[arg(long)]
  pub notes: Option<String>,
  #[arg(long, default_value_t = OrderStatus::Pending)]
  pub status: OrderStatus,
}

impl From<CreateOrderArgs> for CreateOrder {
  fn from(args: CreateOrderArgs) -> Self {
    CreateOrder {
      client_name: args.client,
      client_email: args.email,
      project_type: args.project_type,
      status: args.status,
      deadline: args.deadline,
      amount: args.amount,
      description: args.description,
      notes: args.notes,
    }
  }
}

#[derive(Subcommand, Debug)]
pub enum TasksCommand {
  #[command(visible_alias = "ls")]
  List { order_id: String },
  Add { order_id: String, text: String },
  SetStatus { id: TaskId, status: TaskStatus },
  #[command(visible_alias = "rm")]
  Delete { id: TaskId },
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
  #[command(visible_alias = "ls")]
  List {
    #[arg(short, long)]
    role: Option<Role>,
    /// Match email or full name
    #[arg(short = 'q', long)]
    search: Option<String>,
  },
  Show { id: Uuid },
  Stats,
  SetRole { id: Uuid, role: Role },
  #[command(visible_alias = "rm")]
  Delete { id: Uuid },
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(std::iter::once("orderdesk").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_cli_definition_is_valid() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
  }

  #[test]
  fn test_order_list_filters() {
    let Command::Orders {
      command: OrdersCommand::List(args),
    } = parse(&["orders", "list", "--status", "in-progress", "-q", "acme"])
    else {
      panic!("expected orders list");
    };
    let filter = OrderFilter::from(args);
    assert_eq!(filter.status, Some(OrderStatus::InProgress));
    assert_eq!(filter.search.as_deref(), Some("acme"));
  }

  #[test]
  fn test_aliases() {
    assert!(matches!(
      parse(&["o", "rm", "ORD-001"]),
      Command::Orders {
        command: OrdersCommand::Delete { .. }
      }
    ));
    assert!(matches!(
      parse(&["t", "ls", "ORD-001"]),
      Command::Tasks {
        command: TasksCommand::List { .. }
      }
    ));
  }

  #[test]
  fn test_task_ids_parse_as_numbers() {
    let Command::Tasks {
      command: TasksCommand::SetStatus { id, status },
    } = parse(&["tasks", "set-status", "42", "completed"])
    else {
      panic!("expected tasks set-status");
    };
    assert_eq!(id, TaskId::Number(42));
    assert_eq!(status, TaskStatus::Completed);
  }

  #[test]
  fn test_create_order_defaults_to_pending() {
    let Command::Orders {
      command: OrdersCommand::Create(args),
    } = parse(&[
      "orders",
      "create",
      "--client",
      "Acme",
      "--email",
      "ops@acme.test",
      "--project-type",
      "Website",
      "--deadline",
      "2024-08-01",
      "--amount",
      "1500",
      "--description",
      "Landing page",
    ])
    else {
      panic!("expected orders create");
    };
    let input = CreateOrder::from(args);
    assert_eq!(input.status, OrderStatus::Pending);
    assert_eq!(input.amount, 1500.0);
    assert!(input.validate().is_ok());
  }

  #[test]
  fn test_bad_values_are_rejected() {
    assert!(Cli::try_parse_from(["orderdesk", "orders", "set-status", "ORD-1", "done"]).is_err());
    assert!(Cli::try_parse_from(["orderdesk", "users", "show", "not-a-uuid"]).is_err());
  }
}
