use crate::commands::{Command, OrdersCommand, TasksCommand, UsersCommand};
use color_eyre::Result;
use orderdesk::cache::{CacheResult, CacheSource, CacheStore, QueryClient};
use orderdesk::config::Config;
use orderdesk::gateway::RestGateway;
use orderdesk::model::{
  ChartPoint, CreateTask, Order, OrderFilter, OrderStats, Profile, Task, TaskStatus, UserFilter, UserStats,
};
use orderdesk::notify::{Level, Notification, Notifier};
use orderdesk::sync::Dashboard;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Main application state
pub struct App {
  dashboard: Dashboard<RestGateway>,
  notifications: mpsc::UnboundedReceiver<Notification>,
  gc_interval: Duration,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let gateway = RestGateway::new(config)?;
    let client = QueryClient::new(CacheStore::new(), config.cache.policy());
    let (notifier, notifications) = Notifier::channel();
    info!(backend = %config.backend.url, "starting");

    Ok(Self {
      dashboard: Dashboard::new(Arc::new(gateway), client, notifier),
      notifications,
      gc_interval: config.cache.gc_interval(),
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    self.dashboard.client().spawn_gc(self.gc_interval);
    let result = self.execute(command).await;
    self.print_notifications();
    self.dashboard.client().shutdown();
    result
  }

  async fn execute(&self, command: Command) -> Result<()> {
    match command {
      Command::Orders { command } => self.orders(command).await,
      Command::Tasks { command } => self.tasks(command).await,
      Command::Users { command } => self.users(command).await,
      Command::Chart => {
        let chart = self.dashboard.weekly_chart().await?;
        print_source(&chart);
        print_chart(&chart.data);
        Ok(())
      }
    }
  }

  async fn orders(&self, command: OrdersCommand) -> Result<()> {
    let dashboard = &self.dashboard;
    match command {
      OrdersCommand::List(filter) => {
        let orders = dashboard.list_orders(&filter.into()).await?;
        print_source(&orders);
        print_orders(&orders.data);
      }
      OrdersCommand::Show { id } => {
        let order = dashboard.order(&id).await?;
        print_source(&order);
        print_order(&order.data);
      }
      OrdersCommand::Recent { limit } => {
        let orders = dashboard.recent_orders(limit).await?;
        print_source(&orders);
        print_orders(&orders.data);
      }
      OrdersCommand::Stats => {
        let stats = dashboard.order_stats().await?;
        print_source(&stats);
        print_order_stats(&stats.data);
      }
      OrdersCommand::Create(args) => {
        let order = dashboard.create_order(&args.into()).await?;
        print_order(&order);
      }
      OrdersCommand::SetStatus { id, status } => {
        let order = dashboard.update_order_status(&id, status).await?;
        print_order(&order);
      }
      OrdersCommand::Delete { id } => dashboard.delete_order(&id).await?,
      OrdersCommand::Watch { filter, interval } => {
        self.watch_orders(filter.into(), Duration::from_secs(interval.max(1))).await?
      }
    }
    Ok(())
  }

  /// Print the list whenever it changes until interrupted.
  async fn watch_orders(&self, filter: OrderFilter, interval: Duration) -> Result<()> {
    let mut query = self.dashboard.observe_orders(&filter);
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        _ = ticker.tick() => {
          query.refetch();
        }
        changed = query.changed() => {
          if !changed {
            break;
          }
          if query.is_fetching() {
            continue;
          }
          if let Some(error) = query.error() {
            eprintln!("error: {}", error);
          } else if let Some(orders) = query.data() {
            println!("--- {} ---", chrono::Local::now().format("%H:%M:%S"));
            print_orders(orders);
          }
        }
      }
    }
    Ok(())
  }

  async fn tasks(&self, command: TasksCommand) -> Result<()> {
    let dashboard = &self.dashboard;
    match command {
      TasksCommand::List { order_id } => {
        let tasks = dashboard.list_tasks(&order_id).await?;
        print_source(&tasks);
        print_tasks(&tasks.data);
      }
      TasksCommand::Add { order_id, text } => {
        let task = dashboard.create_task(&CreateTask::new(order_id, text)).await?;
        print_tasks(std::slice::from_ref(&task));
      }
      TasksCommand::SetStatus { id, status } => {
        let task = dashboard.update_task_status(id, status).await?;
        print_tasks(std::slice::from_ref(&task));
      }
      TasksCommand::Delete { id } => dashboard.delete_task(&id).await?,
    }
    Ok(())
  }

  async fn users(&self, command: UsersCommand) -> Result<()> {
    let dashboard = &self.dashboard;
    match command {
      UsersCommand::List { role, search } => {
        let users = dashboard.list_users(&UserFilter { role, search }).await?;
        print_source(&users);
        print_users(&users.data);
      }
      UsersCommand::Show { id } => {
        let user = dashboard.user(id).await?;
        print_source(&user);
        print_users(std::slice::from_ref(&user.data));
      }
      UsersCommand::Stats => {
        let stats = dashboard.user_stats().await?;
        print_source(&stats);
        print_user_stats(&stats.data);
      }
      UsersCommand::SetRole { id, role } => {
        let user = dashboard.set_user_role(id, role).await?;
        print_users(std::slice::from_ref(&user));
      }
      UsersCommand::Delete { id } => dashboard.delete_user(id).await?,
    }
    Ok(())
  }

  fn print_notifications(&mut self) {
    while let Ok(notification) = self.notifications.try_recv() {
      match notification.level {
        Level::Success => println!("{}", notification),
        Level::Error => eprintln!("{}", notification),
      }
    }
  }
}

fn print_source<T>(result: &CacheResult<T>) {
  if result.source == CacheSource::Offline {
    let at = result
      .cached_at
      .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
      .unwrap_or_else(|| "unknown time".to_string());
    eprintln!("(offline: showing data cached at {})", at);
  }
}

fn print_orders(orders: &[Order]) {
  if orders.is_empty() {
    println!("No orders");
    return;
  }
  println!(
    "{:<10} {:<24} {:<16} {:<12} {:<12} {:>10}",
    "ID", "CLIENT", "PROJECT", "STATUS", "DEADLINE", "AMOUNT"
  );
  for order in orders {
    println!(
      "{:<10} {:<24} {:<16} {:<12} {:<12} {:>10.2}",
      order.id,
      truncate(&order.client_name, 24),
      truncate(&order.project_type, 16),
      order.status.as_str(),
      order.deadline,
      order.amount
    );
  }
}

fn print_order(order: &Order) {
  println!("{}  {}", order.id, order.status);
  println!("Client:      {} <{}>", order.client_name, order.client_email);
  println!("Project:     {}", order.project_type);
  println!("Deadline:    {}", order.deadline);
  println!("Amount:      {:.2}", order.amount);
  println!("Created:     {}", order.created_at.format("%Y-%m-%d %H:%M"));
  println!();
  println!("{}", order.description);
  if !order.notes.is_empty() {
    println!();
    println!("Notes: {}", order.notes);
  }
}

fn print_order_stats(stats: &OrderStats) {
  println!("Total:       {}", stats.total);
  println!("Pending:     {}", stats.pending);
  println!("In Progress: {}", stats.in_progress);
  println!("Completed:   {}", stats.completed);
  println!("Cancelled:   {}", stats.cancelled);
  println!("Revenue:     {:.2}", stats.total_revenue);
}

fn print_tasks(tasks: &[Task]) {
  if tasks.is_empty() {
    println!("No tasks");
    return;
  }
  for task in tasks {
    let mark = match task.status {
      TaskStatus::Completed => "x",
      TaskStatus::InProgress => "~",
      TaskStatus::Pending => " ",
    };
    println!("[{}] {:>6}  {}", mark, task.id, task.text);
  }
}

fn print_users(users: &[Profile]) {
  if users.is_empty() {
    println!("No users");
    return;
  }
  println!("{:<36} {:<32} {:<24} {:<6}", "ID", "EMAIL", "NAME", "ROLE");
  for user in users {
    println!(
      "{:<36} {:<32} {:<24} {:<6}",
      user.id,
      truncate(&user.email, 32),
      truncate(user.full_name.as_deref().unwrap_or("-"), 24),
      user.role
    );
  }
}

fn print_user_stats(stats: &UserStats) {
  println!("Total:  {}", stats.total);
  println!("Admins: {}", stats.admins);
  println!("Users:  {}", stats.users);
}

fn print_chart(points: &[ChartPoint]) {
  println!("{:<5} {:>10} {:>10}", "DAY", "AVERAGE", "TODAY");
  for point in points {
    println!("{:<5} {:>10.0} {:>10.0}", point.name, point.average, point.today);
  }
}

fn truncate(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate() {
    assert_eq!(truncate("Acme", 10), "Acme");
    assert_eq!(truncate("Acme Corporation", 5), "Acme…");
    assert_eq!(truncate("Ünïcödé", 7), "Ünïcödé");
  }
}
